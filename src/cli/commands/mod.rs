//! Subcommand implementations.

/// One-shot lookup of a single topic.
pub mod define;

/// Credential management.
pub mod keys;

/// Provider listing and selection.
pub mod providers;

/// Interactive reader.
pub mod read;

use anyhow::Result;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::{ConfigManager, ResolveOptions, ResolvedConfig, resolve_config};
use crate::credentials::CredentialStore;
use crate::dispatcher::Dispatcher;
use crate::orchestrator::Orchestrator;
use crate::output;
use crate::providers::http_client;
use crate::ui::Style;

/// Loads config.toml and merges the CLI overrides into it.
pub fn load_config(options: &ResolveOptions) -> Result<ResolvedConfig> {
    let manager = ConfigManager::new()?;
    let file = manager.load_or_default()?;
    resolve_config(options, &file)
}

/// Wires credentials, backends and the cache into an orchestrator.
pub fn build_orchestrator(
    config: &ResolvedConfig,
    credentials: CredentialStore,
) -> Result<Orchestrator> {
    let client = http_client()?;
    let dispatcher = Dispatcher::from_settings(&config.backends, credentials, &client)
        .with_policy(config.fallback)
        .with_selection_override(config.provider);
    Ok(Orchestrator::new(Arc::new(dispatcher), ResponseCache::new()))
}

/// Prints the key setup hint on the first run without stored keys.
///
/// Returns whether the hint was printed.
pub fn show_key_hint_once(credentials: &CredentialStore) -> bool {
    if output::is_quiet() || credentials.has_stored_secret() || credentials.has_shown_key_prompt() {
        return false;
    }

    eprintln!(
        "{}",
        Style::hint(
            "No API keys stored yet; using the free providers. \
             Run 'encyclo keys set <provider>' for faster, higher quality answers."
        )
    );
    credentials.set_has_shown_key_prompt(true);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ProviderId;

    #[test]
    fn test_key_hint_is_shown_once() {
        let credentials = CredentialStore::in_memory();

        assert!(show_key_hint_once(&credentials));
        assert!(credentials.has_shown_key_prompt());
        assert!(!show_key_hint_once(&credentials));
    }

    #[test]
    fn test_key_hint_skipped_with_stored_key() {
        let credentials = CredentialStore::in_memory();
        credentials.set_api_key(ProviderId::Groq, "gsk");

        assert!(!show_key_hint_once(&credentials));
        assert!(!credentials.has_shown_key_prompt());
    }
}
