use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, RwLock};

use super::DefinitionSource;
use crate::credentials::{CredentialField, CredentialStore, ProviderId};
use crate::definition::sse_parser::{DeltaBatcher, SseLine, sse_to_line_stream};
use crate::definition::{DefinitionRequest, ERROR_MARKER, FragmentStream};

/// Endpoint and sampling parameters of an OpenAI-compatible chat API.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// Full URL of the `chat/completions` endpoint.
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    /// Minimum fragment size in chars; 0 forwards every delta.
    pub batch_chars: usize,
}

impl ChatSettings {
    pub fn deepseek() -> Self {
        Self {
            endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            model: "deepseek-chat".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            top_p: None,
            batch_chars: 40,
        }
    }

    pub fn gemini() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: None,
            batch_chars: 0,
        }
    }

    pub fn groq() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: Some(0.95),
            batch_chars: 40,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// Streams definitions from an OpenAI-compatible chat completions API.
///
/// The API key is read from the credential store at construction and kept
/// current through a change observer.
pub struct ChatCompletionsAdapter {
    provider: ProviderId,
    settings: ChatSettings,
    client: Client,
    api_key: Arc<RwLock<Option<String>>>,
}

impl ChatCompletionsAdapter {
    pub fn new(
        provider: ProviderId,
        settings: ChatSettings,
        client: Client,
        credentials: &CredentialStore,
    ) -> Self {
        let api_key = Arc::new(RwLock::new(credentials.api_key(provider)));

        let snapshot = Arc::clone(&api_key);
        credentials.on_change(move |event| {
            if event.provider == provider
                && event.field == CredentialField::ApiKey
                && let Ok(mut key) = snapshot.write()
            {
                key.clone_from(&event.value);
            }
        });

        Self {
            provider,
            settings,
            client,
            api_key,
        }
    }

    fn current_key(&self) -> Option<String> {
        self.api_key.read().ok().and_then(|key| key.clone())
    }
}

impl DefinitionSource for ChatCompletionsAdapter {
    fn name(&self) -> &'static str {
        self.provider.tag()
    }

    fn stream_definition(&self, request: &DefinitionRequest) -> FragmentStream {
        let api_key = self.current_key();
        let key_name = self.provider.storage_key(CredentialField::ApiKey);
        let provider = self.provider;
        let client = self.client.clone();
        let settings = self.settings.clone();
        let request = request.clone();

        Box::pin(async_stream::stream! {
            let Some(api_key) = api_key else {
                yield format!("{ERROR_MARKER} {}", request.language.not_configured(key_name));
                return;
            };

            let failure = |e: &anyhow::Error| {
                format!(
                    "{ERROR_MARKER} {e:#}. {}",
                    request.language.configure_hint(key_name)
                )
            };

            let prompt = request.prompt();
            let lines = match open_line_stream(&client, &settings, &api_key, &prompt).await {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!(%provider, error = %e, "chat request failed");
                    yield failure(&e);
                    return;
                }
            };

            let mut lines = std::pin::pin!(lines);
            let mut batcher = DeltaBatcher::new(settings.batch_chars);

            while let Some(line) = lines.next().await {
                match line {
                    Ok(SseLine::Delta(delta)) => {
                        if let Some(fragment) = batcher.push(&delta) {
                            yield fragment;
                        }
                    }
                    Ok(SseLine::Done) => break,
                    Err(e) => {
                        tracing::warn!(%provider, error = %e, "chat stream interrupted");
                        if let Some(rest) = batcher.flush() {
                            yield rest;
                        }
                        yield failure(&e);
                        return;
                    }
                }
            }

            if let Some(rest) = batcher.flush() {
                yield rest;
            }
        })
    }
}

async fn open_line_stream(
    client: &Client,
    settings: &ChatSettings,
    api_key: &str,
    prompt: &str,
) -> Result<impl Stream<Item = Result<SseLine>> + Send> {
    let body = ChatCompletionRequest {
        model: &settings.model,
        messages: [Message {
            role: "user",
            content: prompt,
        }],
        stream: true,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        top_p: settings.top_p,
    };

    let response = client
        .post(&settings.endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to connect to API endpoint: {}", settings.endpoint))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP error! status: {}", status.as_u16());
    }

    Ok(sse_to_line_stream(response.bytes_stream()))
}
