//! Credential management command handlers.

use anyhow::{Result, bail};

use crate::credentials::{CredentialField, CredentialStore, ProviderId};
use crate::ui::{self, Style};

const fn field_label(field: CredentialField) -> &'static str {
    match field {
        CredentialField::ApiKey => "API key",
        CredentialField::ApiSecret => "API secret",
    }
}

/// Stores credentials for `provider`, prompting for values not given.
pub fn run_set(
    credentials: &CredentialStore,
    provider: &str,
    key: Option<String>,
    secret: Option<String>,
) -> Result<()> {
    let provider: ProviderId = provider.parse()?;
    if secret.is_some() && !provider.fields().contains(&CredentialField::ApiSecret) {
        bail!("{} does not use an API secret", provider.display_name());
    }

    ui::handle_prompt_cancellation(|| {
        let mut given = [
            (CredentialField::ApiKey, key),
            (CredentialField::ApiSecret, secret),
        ];

        let mut values = Vec::new();
        for field in provider.fields() {
            let value = given
                .iter_mut()
                .find(|(f, _)| f == field)
                .and_then(|(_, value)| value.take())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            let value = match value {
                Some(value) => value,
                None => ui::prompt_secret(&format!(
                    "{} {}:",
                    provider.display_name(),
                    field_label(*field)
                ))?,
            };
            values.push((*field, value));
        }

        for (field, value) in values {
            credentials.set(provider, field, &value);
            println!(
                "{} Saved {}",
                Style::success("✓"),
                Style::value(provider.storage_key(field))
            );
        }
        Ok(())
    })
}

/// Removes the credentials of one provider, or of every provider.
pub fn run_clear(credentials: &CredentialStore, provider: Option<&str>, yes: bool) -> Result<()> {
    if let Some(provider) = provider {
        let provider: ProviderId = provider.parse()?;
        for field in provider.fields() {
            credentials.set(provider, *field, "");
        }
        println!(
            "{} Cleared credentials for {}",
            Style::success("✓"),
            Style::value(provider.display_name())
        );
        return Ok(());
    }

    ui::handle_prompt_cancellation(|| {
        if !yes && !ui::confirm("Remove all stored API keys?", false)? {
            println!("Nothing changed.");
            return Ok(());
        }
        credentials.clear_all_api_keys();
        println!("{} Cleared all stored API keys", Style::success("✓"));
        Ok(())
    })
}

/// Prints which credential fields are stored, without revealing them.
pub fn run_show(credentials: &CredentialStore) {
    println!("{}", Style::header("Stored credentials"));
    for provider in ProviderId::FALLBACK_ORDER {
        for field in provider.fields() {
            let status = if credentials.get(provider, *field).is_some() {
                Style::success("set")
            } else {
                Style::secondary("not set")
            };
            println!(
                "  {:20} {status}",
                Style::label(provider.storage_key(*field))
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_with_values_does_not_prompt() {
        let credentials = CredentialStore::in_memory();

        run_set(
            &credentials,
            "xunfei",
            Some("key".to_string()),
            Some(" secret ".to_string()),
        )
        .unwrap();

        assert_eq!(credentials.api_key(ProviderId::Xunfei).as_deref(), Some("key"));
        assert_eq!(
            credentials.api_secret(ProviderId::Xunfei).as_deref(),
            Some("secret")
        );
        assert!(credentials.has_credential(ProviderId::Xunfei));
    }

    #[test]
    fn test_secret_rejected_for_single_key_provider() {
        let credentials = CredentialStore::in_memory();

        let err = run_set(
            &credentials,
            "groq",
            Some("gsk".to_string()),
            Some("extra".to_string()),
        )
        .unwrap_err();

        assert!(err.to_string().contains("does not use an API secret"));
        assert!(credentials.api_key(ProviderId::Groq).is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let credentials = CredentialStore::in_memory();
        let err = run_set(&credentials, "openai", Some("k".to_string()), None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_clear_one_provider_keeps_others() {
        let credentials = CredentialStore::in_memory();
        credentials.set_api_key(ProviderId::Groq, "gsk");
        credentials.set_api_key(ProviderId::Gemini, "AIza");

        run_clear(&credentials, Some("groq"), false).unwrap();

        assert!(credentials.api_key(ProviderId::Groq).is_none());
        assert_eq!(
            credentials.api_key(ProviderId::Gemini).as_deref(),
            Some("AIza")
        );
    }

    #[test]
    fn test_clear_all_with_yes() {
        let credentials = CredentialStore::in_memory();
        credentials.set_api_key(ProviderId::DeepSeek, "sk");
        credentials.set_api_secret(ProviderId::Xunfei, "secret");
        credentials.set_selected_provider(ProviderId::DeepSeek);

        run_clear(&credentials, None, true).unwrap();

        assert!(!credentials.has_stored_secret());
        assert_eq!(credentials.explicit_selection(), Some(ProviderId::DeepSeek));
    }
}
