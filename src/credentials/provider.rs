use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text-generation backends that can be selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    DeepSeek,
    Gemini,
    Xunfei,
    Groq,
    YouChat,
}

/// A secret a provider may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    ApiKey,
    ApiSecret,
}

impl ProviderId {
    /// Order used when no provider is explicitly selected.
    pub const FALLBACK_ORDER: [Self; 5] = [
        Self::DeepSeek,
        Self::Gemini,
        Self::Groq,
        Self::YouChat,
        Self::Xunfei,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::Xunfei => "xunfei",
            Self::Groq => "groq",
            Self::YouChat => "youchat",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::DeepSeek => "DeepSeek",
            Self::Gemini => "Gemini",
            Self::Xunfei => "Xunfei Spark (freemium)",
            Self::Groq => "Groq",
            Self::YouChat => "YouChat",
        }
    }

    /// Fields that must be non-empty for the provider to be usable.
    pub const fn required_fields(self) -> &'static [CredentialField] {
        match self {
            Self::DeepSeek | Self::Gemini | Self::Groq => &[CredentialField::ApiKey],
            Self::Xunfei => &[CredentialField::ApiKey, CredentialField::ApiSecret],
            Self::YouChat => &[],
        }
    }

    /// Fields the provider can store at all.
    pub const fn fields(self) -> &'static [CredentialField] {
        match self {
            Self::Xunfei => &[CredentialField::ApiKey, CredentialField::ApiSecret],
            _ => &[CredentialField::ApiKey],
        }
    }

    /// Name of the persisted settings entry for `field`.
    pub const fn storage_key(self, field: CredentialField) -> &'static str {
        match (self, field) {
            (Self::DeepSeek, _) => "DEEPSEEK_API_KEY",
            (Self::Gemini, _) => "GEMINI_API_KEY",
            (Self::Groq, _) => "GROQ_API_KEY",
            (Self::YouChat, _) => "YOUCHAT_API_KEY",
            (Self::Xunfei, CredentialField::ApiKey) => "XUNFEI_API_KEY",
            (Self::Xunfei, CredentialField::ApiSecret) => "XUNFEI_API_SECRET",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::FALLBACK_ORDER
            .into_iter()
            .find(|p| p.tag() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Provider '{s}' not found\n\n\
                     Available providers: deepseek, gemini, groq, youchat, xunfei"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for provider in ProviderId::FALLBACK_ORDER {
            assert_eq!(provider.tag().parse::<ProviderId>().ok(), Some(provider));
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = "openai".parse::<ProviderId>().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_xunfei_needs_key_and_secret() {
        assert_eq!(ProviderId::Xunfei.required_fields().len(), 2);
        assert_eq!(
            ProviderId::Xunfei.storage_key(CredentialField::ApiSecret),
            "XUNFEI_API_SECRET"
        );
    }

    #[test]
    fn test_youchat_needs_nothing() {
        assert!(ProviderId::YouChat.required_fields().is_empty());
    }
}
