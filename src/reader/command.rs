use inquire::autocompletion::{Autocomplete, Replacement};

// Available slash commands: (command, description)
const SLASH_COMMANDS: &[(&str, &str)] = &[
    ("/category", "Set or clear the topic category"),
    ("/config", "Show current settings"),
    ("/context", "Set or clear the surrounding text"),
    ("/help", "Show available commands"),
    ("/lang", "Switch content language (zh, en)"),
    ("/provider", "Show or select the provider"),
    ("/quit", "Exit the reader"),
    ("/refresh", "Look up the current topic again, bypassing the cache"),
    ("/reset", "Start a new conversation"),
];

/// Slash command autocompleter
#[derive(Clone, Default)]
pub struct SlashCommandCompleter;

impl Autocomplete for SlashCommandCompleter {
    fn get_suggestions(&mut self, input: &str) -> Result<Vec<String>, inquire::CustomUserError> {
        if !input.starts_with('/') {
            return Ok(vec![]);
        }

        let suggestions: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(input))
            .map(|(cmd, desc)| format!("{cmd}  {desc}"))
            .collect();

        Ok(suggestions)
    }

    fn get_completion(
        &mut self,
        _input: &str,
        highlighted_suggestion: Option<String>,
    ) -> Result<Replacement, inquire::CustomUserError> {
        let replacement =
            highlighted_suggestion.map(|s| s.split_whitespace().next().unwrap_or("").to_string());
        Ok(replacement)
    }
}

/// Slash command types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Lang(Option<String>),
    Provider(Option<String>),
    Category(Option<String>),
    Context(Option<String>),
    Refresh,
    Reset,
    Config,
    Help,
    Quit,
    Unknown(String),
}

/// Input types
#[derive(Debug)]
pub enum Input {
    Topic(String),
    Command(SlashCommand),
    Empty,
}

pub fn parse_input(input: &str) -> Input {
    let input = input.trim();

    if input.is_empty() {
        return Input::Empty;
    }

    input
        .strip_prefix('/')
        .map_or_else(|| Input::Topic(input.to_string()), parse_slash_command)
}

fn parse_slash_command(cmd: &str) -> Input {
    let (name, rest) = cmd
        .split_once(char::is_whitespace)
        .map_or((cmd, ""), |(name, rest)| (name, rest.trim()));
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let command = match name {
        "lang" => SlashCommand::Lang(argument),
        "provider" => SlashCommand::Provider(argument),
        "category" => SlashCommand::Category(argument),
        "context" => SlashCommand::Context(argument),
        "refresh" => SlashCommand::Refresh,
        "reset" => SlashCommand::Reset,
        "config" => SlashCommand::Config,
        "help" => SlashCommand::Help,
        "quit" | "exit" | "q" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(cmd.split_whitespace().collect::<Vec<_>>().join(" ")),
    };
    Input::Command(command)
}
