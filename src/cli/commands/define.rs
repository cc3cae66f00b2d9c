use anyhow::{Result, bail};

use super::{build_orchestrator, show_key_hint_once};
use crate::config::ResolvedConfig;
use crate::credentials::CredentialStore;
use crate::definition::DefinitionRequest;
use crate::input::read_context;
use crate::ui::{LookupOutcome, Style, print_lookup};

pub struct DefineOptions {
    pub topic: String,
    pub category: Option<String>,
    pub context: Option<String>,
    pub context_file: Option<String>,
}

impl DefineOptions {
    fn request(&self, config: &ResolvedConfig) -> Result<DefinitionRequest> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            bail!("Topic is empty");
        }

        let mut request = DefinitionRequest::new(topic, config.language);
        if let Some(category) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            request = request.with_category(category);
        }

        let context = match &self.context_file {
            Some(path) => Some(read_context(path)?),
            None => self.context.clone(),
        };
        if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
            request = request.with_context(context);
        }
        Ok(request)
    }
}

/// Looks up one topic and streams the definition to stdout.
///
/// A failed lookup prints its message to stderr and exits with
/// `EX_UNAVAILABLE`.
pub async fn run_define(options: DefineOptions, config: &ResolvedConfig) -> Result<()> {
    let request = options.request(config)?;

    let credentials = CredentialStore::open_default();
    show_key_hint_once(&credentials);
    let orchestrator = build_orchestrator(config, credentials)?;

    let mut lookup = orchestrator.lookup(request);
    let topic = lookup.key().topic.clone();
    let outcome = print_lookup(&mut lookup, &topic).await?;
    lookup.finished().await;

    if let LookupOutcome::Failed(message) = outcome {
        eprintln!("{}", Style::error(message));
        std::process::exit(exitcode::UNAVAILABLE);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ResolveOptions, resolve_config};
    use crate::definition::Language;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config() -> ResolvedConfig {
        let options = ResolveOptions {
            language: Some("en".to_string()),
            provider: None,
        };
        resolve_config(&options, &ConfigFile::default()).unwrap()
    }

    fn options(topic: &str) -> DefineOptions {
        DefineOptions {
            topic: topic.to_string(),
            category: None,
            context: None,
            context_file: None,
        }
    }

    #[test]
    fn test_request_trims_topic() {
        let request = options("  rain ").request(&config()).unwrap();
        assert_eq!(request.topic, "rain");
        assert_eq!(request.language, Language::En);
    }

    #[test]
    fn test_blank_topic_is_rejected() {
        assert!(options("   ").request(&config()).is_err());
    }

    #[test]
    fn test_blank_category_and_context_are_dropped() {
        let mut options = options("rain");
        options.category = Some(" ".to_string());
        options.context = Some(String::new());

        let request = options.request(&config()).unwrap();
        assert!(request.category.is_none());
        assert!(request.context.is_none());
    }

    #[test]
    fn test_context_file_is_read() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Clouds gathered before the rain.").unwrap();

        let mut options = options("rain");
        options.context_file = Some(file.path().to_str().unwrap().to_string());

        let request = options.request(&config()).unwrap();
        assert_eq!(
            request.context.as_deref(),
            Some("Clouds gathered before the rain.")
        );
    }
}
