//! Chooses the backend for a lookup.

use futures_util::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::credentials::{CredentialStore, ProviderId};
use crate::definition::{
    DefinitionRequest, FragmentKind, FragmentStream, is_error_fragment, single_fragment,
};
use crate::providers::{
    BackendSettings, ChatCompletionsAdapter, DefinitionSource, WikiAdapter, XunfeiAdapter,
    YouChatAdapter,
};

/// What happens when the selected provider has no credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// The selected provider is used anyway and reports the missing key.
    #[default]
    SelectedWins,
    /// Later usable providers in fallback order are tried instead.
    FallThrough,
}

struct Route {
    provider: ProviderId,
    source: Arc<dyn DefinitionSource>,
}

/// Where a request would go.
#[derive(Clone)]
pub struct Routed {
    /// `None` for the terminal fallback.
    pub provider: Option<ProviderId>,
    pub source: Arc<dyn DefinitionSource>,
}

impl Routed {
    /// Streams `request` from this route.
    ///
    /// Cumulative backends are converted to deltas, and a panic inside a
    /// backend becomes an error fragment.
    pub fn stream(&self, request: &DefinitionRequest) -> FragmentStream {
        tracing::info!(
            provider = ?self.provider,
            source = self.source.name(),
            topic = %request.topic,
            "dispatching lookup"
        );

        let source = Arc::clone(&self.source);
        let stream = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            source.stream_definition(request)
        })) {
            Ok(stream) => stream,
            Err(_) => {
                tracing::error!(source = source.name(), "backend panicked while starting");
                return single_fragment(request.error_fragment(PANIC_MESSAGE));
            }
        };

        let stream = match source.kind() {
            FragmentKind::Delta => stream,
            FragmentKind::Cumulative => into_deltas(stream),
        };
        guard_panics(stream, request.clone(), source.name())
    }
}

impl std::fmt::Debug for Routed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routed")
            .field("provider", &self.provider)
            .field("source", &self.source.name())
            .finish()
    }
}

pub struct Dispatcher {
    routes: Vec<Route>,
    terminal: Arc<dyn DefinitionSource>,
    credentials: CredentialStore,
    policy: FallbackPolicy,
    selection_override: Option<ProviderId>,
}

impl Dispatcher {
    pub fn new(credentials: CredentialStore, terminal: Arc<dyn DefinitionSource>) -> Self {
        Self {
            routes: Vec::new(),
            terminal,
            credentials,
            policy: FallbackPolicy::default(),
            selection_override: None,
        }
    }

    /// Builds every backend from `settings`, sharing one HTTP client.
    pub fn from_settings(
        settings: &BackendSettings,
        credentials: CredentialStore,
        client: &reqwest::Client,
    ) -> Self {
        let chat = |provider, settings: &crate::providers::ChatSettings| {
            Arc::new(ChatCompletionsAdapter::new(
                provider,
                settings.clone(),
                client.clone(),
                &credentials,
            ))
        };

        let deepseek = chat(ProviderId::DeepSeek, &settings.deepseek);
        let gemini = chat(ProviderId::Gemini, &settings.gemini);
        let groq = chat(ProviderId::Groq, &settings.groq);
        let youchat = Arc::new(YouChatAdapter::new(settings.youchat.clone(), client.clone()));
        let xunfei = Arc::new(XunfeiAdapter::new(
            settings.xunfei.clone(),
            credentials.clone(),
        ));
        let wiki = Arc::new(WikiAdapter::new(settings.wiki.clone(), client.clone()));

        Self::new(credentials, wiki)
            .with_route(ProviderId::DeepSeek, deepseek)
            .with_route(ProviderId::Gemini, gemini)
            .with_route(ProviderId::Groq, groq)
            .with_route(ProviderId::YouChat, youchat)
            .with_route(ProviderId::Xunfei, xunfei)
    }

    /// Registers `source` for `provider`, replacing any earlier route.
    ///
    /// Routes are kept in fallback order regardless of registration order.
    #[must_use]
    pub fn with_route(mut self, provider: ProviderId, source: Arc<dyn DefinitionSource>) -> Self {
        self.routes.retain(|r| r.provider != provider);
        self.routes.push(Route { provider, source });
        self.routes
            .sort_by_key(|r| ProviderId::FALLBACK_ORDER.iter().position(|p| *p == r.provider));
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Forces `provider` for this dispatcher without touching the stored selection.
    #[must_use]
    pub const fn with_selection_override(mut self, provider: Option<ProviderId>) -> Self {
        self.selection_override = provider;
        self
    }

    pub const fn selection_override(&self) -> Option<ProviderId> {
        self.selection_override
    }

    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub const fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Resets conversation state in every backend that keeps one.
    pub fn reset_conversations(&self) {
        for route in &self.routes {
            route.source.reset_conversation();
        }
        self.terminal.reset_conversation();
    }

    fn preferred_provider(&self) -> Option<ProviderId> {
        self.selection_override
            .or_else(|| self.credentials.explicit_selection())
    }

    /// Provider chosen for this run, whether or not it can answer.
    pub fn active_provider(&self) -> ProviderId {
        self.selection_override
            .unwrap_or_else(|| self.credentials.selected_provider())
    }

    /// Picks the backend a request would be sent to right now.
    pub fn route(&self) -> Routed {
        let usable = |route: &&Route| self.credentials.has_credential(route.provider);

        let chosen = match self.preferred_provider() {
            Some(selected) => match self.policy {
                FallbackPolicy::SelectedWins => self
                    .routes
                    .iter()
                    .find(|r| r.provider == selected)
                    .or_else(|| self.routes.iter().find(usable)),
                FallbackPolicy::FallThrough => {
                    let start = self
                        .routes
                        .iter()
                        .position(|r| r.provider == selected)
                        .unwrap_or(0);
                    self.routes[start..].iter().find(usable)
                }
            },
            None => self.routes.iter().find(usable),
        };

        match chosen {
            Some(route) => Routed {
                provider: Some(route.provider),
                source: Arc::clone(&route.source),
            },
            None => Routed {
                provider: None,
                source: Arc::clone(&self.terminal),
            },
        }
    }

    /// Streams `request` from the backend [`Dispatcher::route`] picks.
    pub fn stream_definition(&self, request: &DefinitionRequest) -> FragmentStream {
        self.route().stream(request)
    }
}

const PANIC_MESSAGE: &str = "the provider failed unexpectedly";

/// Turns a stream of growing snapshots into the new text of each snapshot.
fn into_deltas(stream: FragmentStream) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let mut stream = stream;
        let mut previous = String::new();

        while let Some(snapshot) = stream.next().await {
            if is_error_fragment(&snapshot) {
                yield snapshot;
                return;
            }
            let delta = snapshot
                .strip_prefix(previous.as_str())
                .unwrap_or(snapshot.as_str())
                .to_string();
            previous = snapshot;
            if !delta.is_empty() {
                yield delta;
            }
        }
    })
}

fn guard_panics(
    stream: FragmentStream,
    request: DefinitionRequest,
    source: &'static str,
) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let mut stream = stream;
        loop {
            match AssertUnwindSafe(stream.next()).catch_unwind().await {
                Ok(Some(fragment)) => yield fragment,
                Ok(None) => break,
                Err(_) => {
                    tracing::error!(source, "backend panicked while streaming");
                    yield request.error_fragment(PANIC_MESSAGE);
                    break;
                }
            }
        }
    })
}
