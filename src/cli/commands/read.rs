use anyhow::Result;

use super::{build_orchestrator, show_key_hint_once};
use crate::config::ResolvedConfig;
use crate::credentials::CredentialStore;
use crate::reader::{ReaderSession, SessionConfig};

/// Starts the interactive reader.
pub async fn run_read(config: &ResolvedConfig) -> Result<()> {
    let credentials = CredentialStore::open_default();
    show_key_hint_once(&credentials);
    let orchestrator = build_orchestrator(config, credentials)?;

    let mut session = ReaderSession::new(SessionConfig::new(config.language), orchestrator);
    session.run().await
}
