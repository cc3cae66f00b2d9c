//! Provider listing and selection command handlers.

use anyhow::Result;

use crate::credentials::{CredentialStore, ProviderId};
use crate::ui::Style;

/// Credential status shown next to each provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Ready,
    NoKeyNeeded,
    MissingCredentials,
}

impl ProviderStatus {
    pub fn of(credentials: &CredentialStore, provider: ProviderId) -> Self {
        if provider.required_fields().is_empty() {
            Self::NoKeyNeeded
        } else if credentials.has_credential(provider) {
            Self::Ready
        } else {
            Self::MissingCredentials
        }
    }

    fn styled(self) -> String {
        match self {
            Self::Ready => Style::success("ready"),
            Self::NoKeyNeeded => Style::success("no key needed"),
            Self::MissingCredentials => Style::warning("needs credentials"),
        }
    }
}

/// Lists providers in fallback order with their credential status.
///
/// `active` is the provider lookups currently go to.
pub fn print_providers(credentials: &CredentialStore, active: ProviderId) {
    println!("{}", Style::header("Providers"));
    for provider in ProviderId::FALLBACK_ORDER {
        let marker = if provider == active {
            format!(" {}", Style::selected_marker())
        } else {
            String::new()
        };
        println!(
            "  {:10} {:26} {}{marker}",
            Style::value(provider.tag()),
            provider.display_name(),
            ProviderStatus::of(credentials, provider).styled()
        );
    }
    println!(
        "  {:10} {:26} {}",
        Style::value("wiki"),
        "Wikipedia",
        Style::secondary("used when no provider is usable")
    );
}

/// Persists `provider` as the default for later lookups.
pub fn run_select(credentials: &CredentialStore, provider: &str) -> Result<ProviderId> {
    let provider: ProviderId = provider.parse()?;
    credentials.set_selected_provider(provider);
    println!(
        "{} Selected {}",
        Style::success("✓"),
        Style::value(provider.display_name())
    );

    if ProviderStatus::of(credentials, provider) == ProviderStatus::MissingCredentials {
        eprintln!(
            "{} {} has no credentials yet. Run 'encyclo keys set {}'.",
            Style::warning("Warning:"),
            provider.display_name(),
            provider.tag()
        );
    }
    Ok(provider)
}

/// Forgets the stored selection.
pub fn run_reset(credentials: &CredentialStore) {
    credentials.clear_selected_provider();
    println!(
        "{} Selection cleared; now using {}",
        Style::success("✓"),
        Style::value(credentials.selected_provider().display_name())
    );
}
