//! Backends that stream definitions, one per wire protocol.

mod chat;
mod wiki;
mod xunfei;
mod youchat;

use crate::definition::{DefinitionRequest, FragmentKind, FragmentStream};

pub use chat::{ChatCompletionsAdapter, ChatSettings};
pub use wiki::{WikiAdapter, WikiSettings};
pub use xunfei::{XunfeiAdapter, XunfeiSettings, sign_url};
pub use youchat::{Conversation, Exchange, YouChatAdapter, YouChatSettings};

/// Anything that can stream a definition.
///
/// `stream_definition` must not do any I/O itself: the returned stream opens
/// its transport when first polled. A source never panics on bad input and
/// reports every failure as a last fragment starting with `Error:`.
pub trait DefinitionSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> FragmentKind {
        FragmentKind::Delta
    }

    fn stream_definition(&self, request: &DefinitionRequest) -> FragmentStream;

    /// Forgets any conversation state kept between lookups.
    fn reset_conversation(&self) {}
}

/// Connection settings for every backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub deepseek: ChatSettings,
    pub gemini: ChatSettings,
    pub groq: ChatSettings,
    pub xunfei: XunfeiSettings,
    pub youchat: YouChatSettings,
    pub wiki: WikiSettings,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            deepseek: ChatSettings::deepseek(),
            gemini: ChatSettings::gemini(),
            groq: ChatSettings::groq(),
            xunfei: XunfeiSettings::default(),
            youchat: YouChatSettings::default(),
            wiki: WikiSettings::default(),
        }
    }
}

/// HTTP client shared by the HTTP-based adapters.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
