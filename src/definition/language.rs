//! Content languages and the localized strings the adapters emit.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ui::Style;

/// Supported content languages and their names.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[("zh", "Chinese (Simplified)"), ("en", "English")];

/// Language a definition is requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
}

impl Language {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }

    /// Prefix put in front of every adapter failure message.
    pub fn error_prefix(self, topic: &str) -> String {
        match self {
            Self::Zh => format!("无法为\"{topic}\"生成内容: "),
            Self::En => format!("Could not generate content for \"{topic}\": "),
        }
    }

    /// Message for a provider whose credential field is empty.
    pub fn not_configured(self, field: &str) -> String {
        match self {
            Self::Zh => format!("{field} 未配置。请在设置中配置 API 密钥后继续。"),
            Self::En => format!(
                "{field} is not configured. Please configure your API key in the settings to continue."
            ),
        }
    }

    /// Hint appended to transport failures of keyed providers.
    pub fn configure_hint(self, field: &str) -> String {
        match self {
            Self::Zh => format!("请配置{field}"),
            Self::En => format!("Please configure {field}"),
        }
    }

    pub const fn network_hint(self) -> &'static str {
        match self {
            Self::Zh => "请检查网络连接或稍后再试",
            Self::En => "Please check your network connection or try again later",
        }
    }

    pub fn no_information(self, topic: &str) -> String {
        match self {
            Self::Zh => format!("抱歉，未能找到关于\"{topic}\"的信息。请尝试其他关键词。"),
            Self::En => {
                format!("Sorry, no information found for \"{topic}\". Please try another keyword.")
            }
        }
    }

    pub fn wiki_unreachable(self, attempts: usize) -> String {
        match self {
            Self::Zh => format!("无法连接到维基百科API，尝试了{attempts}种方式"),
            Self::En => format!("Could not reach the Wikipedia API after {attempts} attempts"),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zh" => Ok(Self::Zh),
            "en" => Ok(Self::En),
            _ => anyhow::bail!(
                "Invalid language code: '{s}'\n\n\
                 Valid language codes: zh, en\n\
                 Run 'encyclo languages' to see all supported codes."
            ),
        }
    }
}

/// Prints all supported language codes to stdout.
pub fn print_languages() {
    println!("{}", Style::header("Supported content languages"));
    for (code, name) in SUPPORTED_LANGUAGES {
        println!("  {:5} {}", Style::code(code), Style::secondary(name));
    }
}

/// Validates that the given language code is supported.
pub fn validate_language(lang: &str) -> Result<Language> {
    lang.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_language_valid() {
        assert_eq!(validate_language("zh").ok(), Some(Language::Zh));
        assert_eq!(validate_language("en").ok(), Some(Language::En));
    }

    #[test]
    fn test_validate_language_invalid() {
        assert!(validate_language("ja").is_err());
        assert!(validate_language("").is_err());
        assert!(validate_language("ZH").is_err()); // Case sensitive
    }

    #[test]
    fn test_not_configured_is_localized() {
        assert!(Language::En.not_configured("GROQ_API_KEY").contains("is not configured"));
        assert!(Language::Zh.not_configured("GROQ_API_KEY").contains("未配置"));
    }

    #[test]
    fn test_wiki_unreachable_mentions_attempts() {
        assert!(Language::En.wiki_unreachable(4).contains('4'));
        assert!(Language::Zh.wiki_unreachable(4).contains("尝试了4种方式"));
    }
}
