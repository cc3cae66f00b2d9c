use anyhow::Result;
use inquire::Text;
use inquire::ui::{Attributes, Color, RenderConfig, StyleSheet, Styled};

use super::command::{Input, SlashCommand, SlashCommandCompleter, parse_input};
use super::ui;
use crate::credentials::ProviderId;
use crate::definition::{DefinitionRequest, Language, validate_language};
use crate::orchestrator::{Lookup, Orchestrator, is_new_topic};
use crate::ui::{LookupOutcome, Style, print_lookup};

/// Per-session lookup settings, changed with slash commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub language: Language,
    pub category: Option<String>,
    pub context: Option<String>,
}

impl SessionConfig {
    pub const fn new(language: Language) -> Self {
        Self {
            language,
            category: None,
            context: None,
        }
    }

    /// Builds the request for `topic` from the current settings.
    pub fn request(&self, topic: &str) -> DefinitionRequest {
        let mut request = DefinitionRequest::new(topic, self.language);
        if let Some(category) = &self.category {
            request = request.with_category(category.clone());
        }
        if let Some(context) = &self.context {
            request = request.with_context(context.clone());
        }
        request
    }
}

/// An interactive reader session.
///
/// The response cache and any conversation state live as long as the
/// session, so revisiting a topic is served without a new request.
pub struct ReaderSession {
    config: SessionConfig,
    orchestrator: Orchestrator,
    current_topic: Option<String>,
}

impl ReaderSession {
    pub const fn new(config: SessionConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator,
            current_topic: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        ui::print_header();

        let prompt_style = Styled::new("❯")
            .with_fg(Color::LightBlue)
            .with_attr(Attributes::BOLD);
        let mut render_config = RenderConfig::default()
            .with_prompt_prefix(prompt_style)
            .with_answered_prompt_prefix(prompt_style);

        render_config.option = StyleSheet::new().with_fg(Color::Grey);
        render_config.selected_option = Some(StyleSheet::new().with_fg(Color::DarkMagenta));

        loop {
            let input = Text::new("")
                .with_render_config(render_config)
                .with_autocomplete(SlashCommandCompleter)
                .with_help_message("Type a topic to look up, /help for commands, Ctrl+C to quit")
                .prompt();

            match input {
                Ok(line) => match parse_input(&line) {
                    Input::Empty => {}
                    Input::Command(cmd) => {
                        if !self.handle_command(cmd).await? {
                            break;
                        }
                    }
                    Input::Topic(topic) => self.look_up(&topic).await?,
                },
                Err(
                    inquire::InquireError::OperationCanceled
                    | inquire::InquireError::OperationInterrupted,
                ) => {
                    println!();
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        ui::print_goodbye();
        Ok(())
    }

    /// Returns `false` when the session should end.
    async fn handle_command(&mut self, cmd: SlashCommand) -> Result<bool> {
        match cmd {
            SlashCommand::Lang(value) => self.set_language(value.as_deref()),
            SlashCommand::Provider(value) => self.set_provider(value.as_deref()),
            SlashCommand::Category(value) => {
                ui::print_success(&format!(
                    "Category {}",
                    value.as_deref().map_or_else(
                        || "cleared".to_string(),
                        |c| format!("set to {}", Style::value(c))
                    )
                ));
                self.config.category = value;
                self.current_topic = None;
            }
            SlashCommand::Context(value) => {
                ui::print_success(if value.is_some() {
                    "Context set"
                } else {
                    "Context cleared"
                });
                self.config.context = value;
                self.current_topic = None;
            }
            SlashCommand::Refresh => self.refresh().await?,
            SlashCommand::Reset => {
                self.orchestrator.dispatcher().reset_conversations();
                ui::print_success("Started a new conversation");
            }
            SlashCommand::Config => {
                let dispatcher = self.orchestrator.dispatcher();
                ui::print_config(
                    &self.config,
                    dispatcher.active_provider(),
                    dispatcher.selection_override().is_some(),
                );
            }
            SlashCommand::Help => ui::print_help(),
            SlashCommand::Quit => return Ok(false),
            SlashCommand::Unknown(cmd) => {
                ui::print_error(&format!("Unknown command: /{cmd}"));
            }
        }
        Ok(true)
    }

    fn set_language(&mut self, value: Option<&str>) {
        let Some(code) = value else {
            println!(
                "Content language: {}",
                Style::value(self.config.language)
            );
            return;
        };

        match validate_language(code) {
            Ok(language) => {
                self.config.language = language;
                self.current_topic = None;
                ui::print_success(&format!(
                    "Content language set to {}",
                    Style::value(language)
                ));
            }
            Err(e) => ui::print_error(&e.to_string()),
        }
    }

    fn set_provider(&mut self, value: Option<&str>) {
        let Some(tag) = value else {
            let dispatcher = self.orchestrator.dispatcher();
            println!(
                "Provider: {}",
                Style::value(dispatcher.active_provider().tag())
            );
            return;
        };

        let provider: ProviderId = match tag.parse() {
            Ok(provider) => provider,
            Err(e) => {
                ui::print_error(&e.to_string());
                return;
            }
        };

        self.current_topic = None;
        let dispatcher = self.orchestrator.dispatcher();
        dispatcher.credentials().set_selected_provider(provider);
        ui::print_success(&format!(
            "Provider set to {}",
            Style::value(provider.display_name())
        ));
        if let Some(forced) = dispatcher.selection_override() {
            ui::print_warning(&format!(
                "{} is forced for this run; the new selection applies to later runs",
                forced.tag()
            ));
        } else if !dispatcher.credentials().has_credential(provider) {
            ui::print_warning(&format!(
                "{} has no credentials yet. Run 'encyclo keys set {}'.",
                provider.display_name(),
                provider.tag()
            ));
        }
    }

    async fn look_up(&mut self, topic: &str) -> Result<()> {
        if !is_new_topic(self.current_topic.as_deref(), topic) {
            println!(
                "{}",
                Style::hint("Already showing this topic. Use /refresh to fetch it again.")
            );
            return Ok(());
        }

        ui::print_topic(topic);
        self.current_topic = Some(topic.to_string());
        let lookup = self.orchestrator.lookup(self.config.request(topic));
        self.follow(lookup, topic).await
    }

    async fn refresh(&self) -> Result<()> {
        let Some(topic) = self.current_topic.as_deref() else {
            ui::print_error("No topic to refresh yet");
            return Ok(());
        };

        ui::print_topic(topic);
        let lookup = self.orchestrator.refresh(self.config.request(topic));
        self.follow(lookup, topic).await
    }

    /// Prints a lookup; Ctrl+C cancels it without leaving the session.
    async fn follow(&self, mut lookup: Lookup, topic: &str) -> Result<()> {
        let outcome = tokio::select! {
            outcome = print_lookup(&mut lookup, topic) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                self.orchestrator.cancel_current();
                println!();
                println!("{}", Style::hint("Cancelled"));
                LookupOutcome::Superseded
            }
        };

        if let LookupOutcome::Failed(message) = outcome {
            eprintln!("{}", Style::error(message));
        }
        println!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_session_settings() {
        let mut config = SessionConfig::new(Language::En);
        config.category = Some("physics".to_string());
        config.context = Some("light bends near a black hole".to_string());

        let request = config.request("gravity");

        assert_eq!(request.topic, "gravity");
        assert_eq!(request.language, Language::En);
        assert_eq!(request.category.as_deref(), Some("physics"));
        assert_eq!(
            request.context.as_deref(),
            Some("light bends near a black hole")
        );
    }

    #[test]
    fn test_request_without_extras() {
        let request = SessionConfig::new(Language::Zh).request("雨");
        assert_eq!(request.language, Language::Zh);
        assert!(request.category.is_none());
        assert!(request.context.is_none());
    }
}
