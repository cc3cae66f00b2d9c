mod language;
mod prompt;
pub mod sse_parser;

use futures_util::Stream;
use std::pin::Pin;

pub use language::{Language, SUPPORTED_LANGUAGES, print_languages, validate_language};
pub use prompt::build_prompt;

/// Marker every failure fragment starts with.
pub const ERROR_MARKER: &str = "Error:";

/// Incremental text fragments of one definition lookup.
///
/// Finite and never fails: a failure is a last fragment starting with
/// [`ERROR_MARKER`].
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Whether a source yields new text only, or the full text so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FragmentKind {
    #[default]
    Delta,
    Cumulative,
}

/// A lookup of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRequest {
    pub topic: String,
    pub language: Language,
    pub category: Option<String>,
    pub context: Option<String>,
}

impl DefinitionRequest {
    pub fn new(topic: impl Into<String>, language: Language) -> Self {
        Self {
            topic: topic.into(),
            language,
            category: None,
            context: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn prompt(&self) -> String {
        build_prompt(
            &self.topic,
            self.language,
            self.category.as_deref(),
            self.context.as_deref(),
        )
    }

    /// Formats a failure as an in-band error fragment.
    pub fn error_fragment(&self, message: &str) -> String {
        format!(
            "{ERROR_MARKER} {}{message}",
            self.language.error_prefix(&self.topic)
        )
    }
}

pub fn is_error_fragment(fragment: &str) -> bool {
    fragment.starts_with(ERROR_MARKER)
}

/// A stream that yields `fragment` and ends.
pub fn single_fragment(fragment: String) -> FragmentStream {
    Box::pin(futures_util::stream::once(async move { fragment }))
}
