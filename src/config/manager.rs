use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::ProviderId;
use crate::definition::{Language, validate_language};
use crate::dispatcher::FallbackPolicy;
use crate::paths;
use crate::providers::{BackendSettings, ChatSettings, WikiSettings, XunfeiSettings};

/// Default settings in the `[encyclo]` section of config.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncycloConfig {
    /// Default content language (`zh` or `en`).
    pub language: Option<String>,
    /// Provider used for every lookup, overriding the stored selection.
    pub provider: Option<String>,
    /// What happens when the selected provider has no credentials.
    pub fallback: Option<FallbackPolicy>,
}

/// Overrides for one backend in a `[providers.<id>]` section.
///
/// Fields that do not apply to a backend are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOverride {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub batch_chars: Option<usize>,
    pub app_id: Option<String>,
    pub domain: Option<String>,
}

/// Overrides for the encyclopedia fallback in the `[wiki]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiOverride {
    pub zh_endpoint: Option<String>,
    pub en_endpoint: Option<String>,
    pub proxies: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub slice_chars: Option<usize>,
    pub slice_delay_ms: Option<u64>,
}

/// The complete configuration file structure.
///
/// Corresponds to `~/.config/encyclo/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub encyclo: EncycloConfig,
    /// Backend overrides keyed by provider id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOverride>,
    #[serde(default)]
    pub wiki: WikiOverride,
}

/// Resolved configuration after merging CLI arguments and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub language: Language,
    /// Provider forced for this run, if any.
    pub provider: Option<ProviderId>,
    pub fallback: FallbackPolicy,
    pub backends: BackendSettings,
}

/// CLI overrides that take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub language: Option<String>,
    pub provider: Option<String>,
}

/// Resolves configuration by merging CLI options with config file settings.
///
/// # Errors
///
/// Returns an error for an unknown language or provider id, an unknown
/// `[providers.*]` section, or a zero timeout.
pub fn resolve_config(options: &ResolveOptions, config_file: &ConfigFile) -> Result<ResolvedConfig> {
    let language = match options
        .language
        .as_deref()
        .or(config_file.encyclo.language.as_deref())
    {
        Some(code) => validate_language(code)?,
        None => Language::default(),
    };

    let provider = options
        .provider
        .as_deref()
        .or(config_file.encyclo.provider.as_deref())
        .map(str::parse::<ProviderId>)
        .transpose()?;

    let mut backends = BackendSettings::default();
    for (name, overrides) in &config_file.providers {
        let id: ProviderId = name.parse().with_context(|| {
            format!("Unknown provider section [providers.{name}] in config.toml")
        })?;
        match id {
            ProviderId::DeepSeek => apply_chat(&mut backends.deepseek, overrides),
            ProviderId::Gemini => apply_chat(&mut backends.gemini, overrides),
            ProviderId::Groq => apply_chat(&mut backends.groq, overrides),
            ProviderId::Xunfei => apply_xunfei(&mut backends.xunfei, overrides),
            ProviderId::YouChat => {
                if let Some(endpoint) = &overrides.endpoint {
                    backends.youchat.endpoint.clone_from(endpoint);
                }
            }
        }
    }
    apply_wiki(&mut backends.wiki, &config_file.wiki)?;

    Ok(ResolvedConfig {
        language,
        provider,
        fallback: config_file.encyclo.fallback.unwrap_or_default(),
        backends,
    })
}

fn apply_chat(settings: &mut ChatSettings, overrides: &ProviderOverride) {
    if let Some(endpoint) = &overrides.endpoint {
        settings.endpoint.clone_from(endpoint);
    }
    if let Some(model) = &overrides.model {
        settings.model.clone_from(model);
    }
    if let Some(max_tokens) = overrides.max_tokens {
        settings.max_tokens = max_tokens;
    }
    if let Some(temperature) = overrides.temperature {
        settings.temperature = temperature;
    }
    if overrides.top_p.is_some() {
        settings.top_p = overrides.top_p;
    }
    if let Some(batch_chars) = overrides.batch_chars {
        settings.batch_chars = batch_chars;
    }
}

fn apply_xunfei(settings: &mut XunfeiSettings, overrides: &ProviderOverride) {
    if let Some(endpoint) = &overrides.endpoint {
        settings.endpoint.clone_from(endpoint);
    }
    if let Some(app_id) = &overrides.app_id {
        settings.app_id.clone_from(app_id);
    }
    if let Some(domain) = &overrides.domain {
        settings.domain.clone_from(domain);
    }
    if let Some(max_tokens) = overrides.max_tokens {
        settings.max_tokens = max_tokens;
    }
    if let Some(top_k) = overrides.top_k {
        settings.top_k = top_k;
    }
    if let Some(temperature) = overrides.temperature {
        settings.temperature = temperature;
    }
    if let Some(batch_chars) = overrides.batch_chars {
        settings.batch_chars = batch_chars;
    }
}

fn apply_wiki(settings: &mut WikiSettings, overrides: &WikiOverride) -> Result<()> {
    if let Some(endpoint) = &overrides.zh_endpoint {
        settings.zh_endpoint.clone_from(endpoint);
    }
    if let Some(endpoint) = &overrides.en_endpoint {
        settings.en_endpoint.clone_from(endpoint);
    }
    if let Some(proxies) = &overrides.proxies {
        settings.proxies.clone_from(proxies);
    }
    if let Some(secs) = overrides.timeout_secs {
        if secs == 0 {
            bail!("Invalid [wiki] timeout_secs: must be greater than 0");
        }
        settings.timeout = Duration::from_secs(secs);
    }
    if let Some(chars) = overrides.slice_chars {
        settings.slice_chars = chars;
    }
    if let Some(ms) = overrides.slice_delay_ms {
        settings.slice_delay = Duration::from_millis(ms);
    }
    Ok(())
}

/// Locates and loads the configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new config manager.
    ///
    /// Configuration is stored at `$XDG_CONFIG_HOME/encyclo/config.toml`
    /// or `~/.config/encyclo/config.toml` if `XDG_CONFIG_HOME` is not set.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: paths::config_dir()?.join("config.toml"),
        })
    }

    pub const fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn load(&self) -> Result<ConfigFile> {
        let contents = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        toml::from_str(&contents).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })
    }

    /// Loads the file, or the defaults when it does not exist yet.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(&self) -> Result<ConfigFile> {
        if self.config_path.exists() {
            self.load()
        } else {
            Ok(ConfigFile::default())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manager(temp_dir: &TempDir) -> ConfigManager {
        ConfigManager {
            config_path: temp_dir.path().join("config.toml"),
        }
    }

    fn parse(toml_text: &str) -> ConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);
        fs::write(
            manager.config_path(),
            "[encyclo]\nlanguage = \"en\"\nfallback = \"fall-through\"\n\n[providers.groq]\nmodel = \"llama-3.3-70b-versatile\"\n",
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.encyclo.language.as_deref(), Some("en"));
        assert_eq!(config.encyclo.fallback, Some(FallbackPolicy::FallThrough));
        assert_eq!(
            config.providers["groq"].model.as_deref(),
            Some("llama-3.3-70b-versatile")
        );
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);

        assert!(manager.load().is_err());
        assert_eq!(manager.load_or_default().unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_load_or_default_reports_broken_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);
        fs::write(manager.config_path(), "[encyclo\nlanguage = ").unwrap();

        assert!(manager.load_or_default().is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let resolved = resolve_config(&ResolveOptions::default(), &ConfigFile::default()).unwrap();

        assert_eq!(resolved.language, Language::Zh);
        assert_eq!(resolved.provider, None);
        assert_eq!(resolved.fallback, FallbackPolicy::SelectedWins);
        assert_eq!(resolved.backends.deepseek, ChatSettings::deepseek());
        assert_eq!(resolved.backends.wiki, WikiSettings::default());
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let config = parse(
            r#"
            [encyclo]
            language = "zh"
            provider = "gemini"
            "#,
        );
        let options = ResolveOptions {
            language: Some("en".to_string()),
            provider: Some("groq".to_string()),
        };

        let resolved = resolve_config(&options, &config).unwrap();
        assert_eq!(resolved.language, Language::En);
        assert_eq!(resolved.provider, Some(ProviderId::Groq));
    }

    #[test]
    fn test_resolve_falls_back_to_file() {
        let config = parse(
            r#"
            [encyclo]
            language = "en"
            provider = "deepseek"
            fallback = "fall-through"
            "#,
        );

        let resolved = resolve_config(&ResolveOptions::default(), &config).unwrap();
        assert_eq!(resolved.language, Language::En);
        assert_eq!(resolved.provider, Some(ProviderId::DeepSeek));
        assert_eq!(resolved.fallback, FallbackPolicy::FallThrough);
    }

    #[test]
    fn test_resolve_provider_overrides() {
        let config = parse(
            r#"
            [providers.deepseek]
            endpoint = "http://localhost:8080/v1/chat/completions"
            max_tokens = 800
            batch_chars = 0

            [providers.xunfei]
            app_id = "abc123"
            top_k = 4

            [providers.youchat]
            endpoint = "http://localhost:9090/search"

            [wiki]
            proxies = []
            timeout_secs = 3
            slice_delay_ms = 0
            "#,
        );

        let backends = resolve_config(&ResolveOptions::default(), &config)
            .unwrap()
            .backends;

        assert_eq!(
            backends.deepseek.endpoint,
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(backends.deepseek.max_tokens, 800);
        assert_eq!(backends.deepseek.batch_chars, 0);
        assert_eq!(backends.deepseek.model, "deepseek-chat");
        assert_eq!(backends.xunfei.app_id, "abc123");
        assert_eq!(backends.xunfei.top_k, 4);
        assert_eq!(backends.youchat.endpoint, "http://localhost:9090/search");
        assert!(backends.wiki.proxies.is_empty());
        assert_eq!(backends.wiki.timeout, Duration::from_secs(3));
        assert!(backends.wiki.slice_delay.is_zero());
    }

    #[test]
    fn test_resolve_invalid_language() {
        let options = ResolveOptions {
            language: Some("fr".to_string()),
            ..ResolveOptions::default()
        };
        let err = resolve_config(&options, &ConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid language code"));
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let options = ResolveOptions {
            provider: Some("openai".to_string()),
            ..ResolveOptions::default()
        };
        let err = resolve_config(&options, &ConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_resolve_unknown_provider_section() {
        let config = parse("[providers.openai]\nmodel = \"gpt-4o\"\n");
        let err = resolve_config(&ResolveOptions::default(), &config).unwrap_err();
        assert!(err.to_string().contains("[providers.openai]"));
    }

    #[test]
    fn test_resolve_zero_timeout() {
        let config = parse("[wiki]\ntimeout_secs = 0\n");
        assert!(resolve_config(&ResolveOptions::default(), &config).is_err());
    }
}
