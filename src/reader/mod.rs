//! Interactive reader for looking up one topic after another.
//!
//! Provides a REPL-style interface with slash commands for changing the
//! language, provider, category and context between lookups.

/// Slash command parsing and autocomplete.
pub mod command;
mod session;
mod ui;

pub use session::{ReaderSession, SessionConfig};
