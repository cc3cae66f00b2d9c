//! Reader UI components.

use crate::credentials::ProviderId;
use crate::ui::Style;

use super::session::SessionConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn print_header() {
    println!(
        "{} {} - Interactive Reader",
        Style::header("encyclo"),
        Style::version(format!("v{VERSION}"))
    );
    println!();
}

pub fn print_goodbye() {
    println!("{}", Style::success("Goodbye!"));
}

pub fn print_topic(topic: &str) {
    println!("{}", Style::topic(topic));
}

pub fn print_config(config: &SessionConfig, provider: ProviderId, overridden: bool) {
    let provider = if overridden {
        format!("{} {}", provider.tag(), Style::secondary("(override)"))
    } else {
        provider.tag().to_string()
    };
    let unset = || Style::secondary("(none)");

    println!("{}", Style::header("Configuration"));
    println!(
        "  {}   {}",
        Style::label("provider"),
        Style::value(provider)
    );
    println!(
        "  {}   {}",
        Style::label("language"),
        Style::value(config.language)
    );
    println!(
        "  {}   {}",
        Style::label("category"),
        config
            .category
            .as_deref()
            .map_or_else(unset, Style::value)
    );
    println!(
        "  {}    {}",
        Style::label("context"),
        config.context.as_deref().map_or_else(unset, Style::value)
    );
    println!();
}

pub fn print_help() {
    let commands = [
        ("/lang <zh|en>", "Switch content language"),
        ("/provider [id]", "Show or select the provider"),
        ("/category [name]", "Set or clear the topic category"),
        ("/context [text]", "Set or clear the surrounding text"),
        ("/refresh", "Look up the current topic again"),
        ("/reset", "Start a new conversation"),
        ("/config", "Show current settings"),
        ("/help", "Show this help"),
        ("/quit", "Exit the reader"),
    ];

    println!("{}", Style::header("Available commands"));
    for (command, description) in commands {
        println!(
            "  {}  {}",
            Style::command(format!("{command:<17}")),
            Style::secondary(description)
        );
    }
    println!();
}

pub fn print_success(message: &str) {
    println!("{} {message}", Style::success("✓"));
}

pub fn print_warning(message: &str) {
    eprintln!("{} {message}", Style::warning("Warning:"));
}

pub fn print_error(message: &str) {
    eprintln!("{} {message}", Style::error("Error:"));
    eprintln!();
}
