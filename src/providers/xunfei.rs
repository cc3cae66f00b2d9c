use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio_tungstenite::tungstenite::Message;

use super::DefinitionSource;
use crate::credentials::{CredentialField, CredentialStore, ProviderId};
use crate::definition::sse_parser::{DONE_LINE, DeltaBatcher, SseLine, delta_line, parse_sse_line};
use crate::definition::{DefinitionRequest, ERROR_MARKER, FragmentStream};

type HmacSha256 = Hmac<Sha256>;

/// Parameters of the signed WebSocket chat API.
#[derive(Debug, Clone, PartialEq)]
pub struct XunfeiSettings {
    pub endpoint: String,
    pub app_id: String,
    pub domain: String,
    pub max_tokens: u32,
    pub top_k: u32,
    pub temperature: f32,
    pub batch_chars: usize,
}

impl Default for XunfeiSettings {
    fn default() -> Self {
        Self {
            endpoint: "wss://spark-api.xf-yun.com/v1/x1".to_string(),
            app_id: "7802f8ba".to_string(),
            domain: "x1".to_string(),
            max_tokens: 32768,
            top_k: 6,
            temperature: 1.2,
            batch_chars: 30,
        }
    }
}

/// Appends the `authorization`, `date` and `host` query parameters.
///
/// The signature is an HMAC-SHA256 over the host, the RFC 1123 date and the
/// GET request line, keyed with `api_secret`.
pub fn sign_url(
    endpoint: &str,
    api_key: &str,
    api_secret: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut url =
        Url::parse(endpoint).with_context(|| format!("Invalid WebSocket endpoint: {endpoint}"))?;

    let host_name = url
        .host_str()
        .with_context(|| format!("WebSocket endpoint has no host: {endpoint}"))?;
    let host = match url.port() {
        Some(port) => format!("{host_name}:{port}"),
        None => host_name.to_string(),
    };

    let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let request_line = format!("GET {} HTTP/1.1", url.path());
    let canonical = format!("host: {host}\ndate: {date}\n{request_line}");

    let mut mac =
        HmacSha256::new_from_slice(api_secret.as_bytes()).context("Invalid signing secret")?;
    mac.update(canonical.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let authorization = STANDARD.encode(format!(
        "api_key=\"{api_key}\", algorithm=\"hmac-sha256\", \
         headers=\"host date request-line\", signature=\"{signature}\""
    ));

    url.query_pairs_mut()
        .append_pair("authorization", &authorization)
        .append_pair("date", &date)
        .append_pair("host", &host);

    Ok(url.into())
}

#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    header: RequestHeader<'a>,
    parameter: Parameter<'a>,
    payload: RequestPayload<'a>,
}

#[derive(Debug, Serialize)]
struct RequestHeader<'a> {
    app_id: &'a str,
}

#[derive(Debug, Serialize)]
struct Parameter<'a> {
    chat: ChatParameter<'a>,
}

#[derive(Debug, Serialize)]
struct ChatParameter<'a> {
    max_tokens: u32,
    domain: &'a str,
    top_k: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct RequestPayload<'a> {
    message: MessageList<'a>,
}

#[derive(Debug, Serialize)]
struct MessageList<'a> {
    text: [TextItem<'a>; 2],
}

#[derive(Debug, Serialize)]
struct TextItem<'a> {
    role: &'static str,
    content: &'a str,
}

fn request_frame(settings: &XunfeiSettings, prompt: &str) -> Result<String> {
    let frame = RequestFrame {
        header: RequestHeader {
            app_id: &settings.app_id,
        },
        parameter: Parameter {
            chat: ChatParameter {
                max_tokens: settings.max_tokens,
                domain: &settings.domain,
                top_k: settings.top_k,
                temperature: settings.temperature,
            },
        },
        payload: RequestPayload {
            message: MessageList {
                text: [
                    TextItem {
                        role: "system",
                        content: "",
                    },
                    TextItem {
                        role: "user",
                        content: prompt,
                    },
                ],
            },
        },
    };
    serde_json::to_string(&frame).context("Failed to serialize request frame")
}

#[derive(Debug, Default, Deserialize)]
struct ResponseFrame {
    #[serde(default)]
    header: ResponseHeader,
    #[serde(default)]
    payload: Option<ResponsePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    choices: ResponseChoices,
}

#[derive(Debug, Deserialize)]
struct ResponseChoices {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    text: Vec<ResponseText>,
}

#[derive(Debug, Deserialize)]
struct ResponseText {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of one inbound frame, expressed in the shared line protocol.
#[derive(Debug, PartialEq, Eq)]
enum FrameLines {
    Lines(Vec<String>),
    Failed(String),
}

fn frame_lines(frame: &ResponseFrame) -> FrameLines {
    if frame.header.code != 0 {
        return FrameLines::Failed(format!(
            "API error {}: {}",
            frame.header.code, frame.header.message
        ));
    }

    let mut lines = Vec::new();
    if let Some(payload) = &frame.payload {
        if let Some(content) = payload
            .choices
            .text
            .first()
            .and_then(|t| t.content.as_deref())
            .filter(|c| !c.is_empty())
        {
            lines.push(delta_line(content));
        }
        if payload.choices.status == 2 {
            lines.push(DONE_LINE.to_string());
        }
    }
    FrameLines::Lines(lines)
}

/// Streams definitions over the signed WebSocket API.
///
/// Needs both an API key and an API secret.
pub struct XunfeiAdapter {
    settings: XunfeiSettings,
    credentials: CredentialStore,
}

impl XunfeiAdapter {
    pub fn new(settings: XunfeiSettings, credentials: CredentialStore) -> Self {
        Self {
            settings,
            credentials,
        }
    }
}

impl DefinitionSource for XunfeiAdapter {
    fn name(&self) -> &'static str {
        ProviderId::Xunfei.tag()
    }

    fn stream_definition(&self, request: &DefinitionRequest) -> FragmentStream {
        let api_key = self.credentials.api_key(ProviderId::Xunfei);
        let api_secret = self.credentials.api_secret(ProviderId::Xunfei);
        let settings = self.settings.clone();
        let request = request.clone();

        Box::pin(async_stream::stream! {
            let (Some(api_key), Some(api_secret)) = (api_key, api_secret) else {
                let missing = ProviderId::Xunfei.storage_key(CredentialField::ApiSecret);
                let field = ProviderId::Xunfei.storage_key(CredentialField::ApiKey);
                yield format!(
                    "{ERROR_MARKER} {}",
                    request.language.not_configured(&format!("{field} / {missing}"))
                );
                return;
            };

            let failure = |message: &str| {
                format!("{ERROR_MARKER} {message}. {}", request.language.network_hint())
            };

            let url = match sign_url(&settings.endpoint, &api_key, &api_secret, Utc::now()) {
                Ok(url) => url,
                Err(e) => {
                    yield failure(&format!("{e:#}"));
                    return;
                }
            };
            let frame = match request_frame(&settings, &request.prompt()) {
                Ok(frame) => frame,
                Err(e) => {
                    yield failure(&format!("{e:#}"));
                    return;
                }
            };

            let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    tracing::warn!(error = %e, "websocket connect failed");
                    yield failure(&format!("WebSocket connect failed: {e}"));
                    return;
                }
            };

            if let Err(e) = ws.send(Message::Text(frame.into())).await {
                yield failure(&format!("WebSocket send failed: {e}"));
                return;
            }

            let mut batcher = DeltaBatcher::new(settings.batch_chars);

            while let Some(message) = ws.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket stream interrupted");
                        if let Some(rest) = batcher.flush() {
                            yield rest;
                        }
                        yield failure(&format!("WebSocket error: {e}"));
                        return;
                    }
                };

                let frame = match serde_json::from_str::<ResponseFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping malformed frame");
                        continue;
                    }
                };

                match frame_lines(&frame) {
                    FrameLines::Failed(message) => {
                        if let Some(rest) = batcher.flush() {
                            yield rest;
                        }
                        let _ = ws.close(None).await;
                        yield failure(&message);
                        return;
                    }
                    FrameLines::Lines(lines) => {
                        for line in lines {
                            match parse_sse_line(&line) {
                                Some(SseLine::Delta(delta)) => {
                                    if let Some(fragment) = batcher.push(&delta) {
                                        yield fragment;
                                    }
                                }
                                Some(SseLine::Done) => {
                                    if let Some(rest) = batcher.flush() {
                                        yield rest;
                                    }
                                    let _ = ws.close(None).await;
                                    return;
                                }
                                None => {}
                            }
                        }
                    }
                }
            }

            if let Some(rest) = batcher.flush() {
                yield rest;
            }
            yield failure("WebSocket closed before the answer completed");
        })
    }
}
