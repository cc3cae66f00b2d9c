use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::DefinitionSource;
use crate::credentials::ProviderId;
use crate::definition::{DefinitionRequest, ERROR_MARKER, FragmentStream};

const TOKEN_QUEUE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YouChatSettings {
    pub endpoint: String,
}

impl Default for YouChatSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://you.com/api/streamingSearch".to_string(),
        }
    }
}

/// One completed question and answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Conversation state sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub chat_id: Uuid,
    pub history: Vec<Exchange>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            chat_id: Uuid::new_v4(),
            history: Vec::new(),
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(rename = "youChatToken", default)]
    token: Option<String>,
}

#[derive(Debug)]
enum Event {
    Token(String),
    Failed(String),
}

/// Streams definitions from the keyless community chat endpoint.
///
/// Tokens arrive as named server-sent events on a background task and are
/// handed to the consumer through a bounded channel. An answer is added to
/// the conversation history only once the server sends `done`.
pub struct YouChatAdapter {
    settings: YouChatSettings,
    client: Client,
    conversation: Arc<Mutex<Conversation>>,
}

impl YouChatAdapter {
    pub fn new(settings: YouChatSettings, client: Client) -> Self {
        Self {
            settings,
            client,
            conversation: Arc::new(Mutex::new(Conversation::new())),
        }
    }

    pub fn conversation(&self) -> Conversation {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DefinitionSource for YouChatAdapter {
    fn name(&self) -> &'static str {
        ProviderId::YouChat.tag()
    }

    fn stream_definition(&self, request: &DefinitionRequest) -> FragmentStream {
        let client = self.client.clone();
        let endpoint = self.settings.endpoint.clone();
        let conversation = Arc::clone(&self.conversation);
        let request = request.clone();

        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::channel(TOKEN_QUEUE);
            tokio::spawn(pump_events(client, endpoint, request.prompt(), conversation, tx));

            while let Some(event) = rx.recv().await {
                match event {
                    Event::Token(token) => yield token,
                    Event::Failed(message) => {
                        yield format!(
                            "{ERROR_MARKER} {message}. {}",
                            request.language.network_hint()
                        );
                        return;
                    }
                }
            }
        })
    }

    /// Starts a fresh conversation with a new id and no history.
    fn reset_conversation(&self) {
        *self
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Conversation::new();
    }
}

fn request_url(endpoint: &str, prompt: &str, conversation: &Conversation) -> anyhow::Result<Url> {
    let chat_id = conversation.chat_id.to_string();
    let history = serde_json::to_string(&conversation.history)?;
    let url = Url::parse_with_params(
        endpoint,
        &[
            ("q", prompt),
            ("domain", "youchat"),
            ("chatId", chat_id.as_str()),
            ("queryTraceId", chat_id.as_str()),
            ("chat", history.as_str()),
        ],
    )?;
    Ok(url)
}

/// Reads the event stream and forwards tokens until `done` or a failure.
///
/// Keeps reading after the consumer goes away so a finished answer still
/// lands in the history.
async fn pump_events(
    client: Client,
    endpoint: String,
    prompt: String,
    conversation: Arc<Mutex<Conversation>>,
    tx: mpsc::Sender<Event>,
) {
    let snapshot = conversation
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    let url = match request_url(&endpoint, &prompt, &snapshot) {
        Ok(url) => url,
        Err(e) => {
            let _ = tx.send(Event::Failed(format!("{e:#}"))).await;
            return;
        }
    };

    let response = match client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "community chat request failed");
            let _ = tx.send(Event::Failed(e.to_string())).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = tx
            .send(Event::Failed(format!("HTTP error! status: {}", status.as_u16())))
            .await;
        return;
    }

    let mut events = response.bytes_stream().eventsource();
    let mut answer = String::new();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "community chat stream interrupted");
                let _ = tx.send(Event::Failed(format!("Stream error: {e}"))).await;
                return;
            }
        };

        match event.event.as_str() {
            "youChatToken" => {
                let Some(token) = serde_json::from_str::<TokenData>(&event.data)
                    .ok()
                    .and_then(|data| data.token)
                    .filter(|t| !t.is_empty())
                else {
                    continue;
                };
                answer.push_str(&token);
                let _ = tx.send(Event::Token(token)).await;
            }
            "done" => {
                let mut conversation = conversation.lock().unwrap_or_else(PoisonError::into_inner);
                if conversation.chat_id == snapshot.chat_id {
                    conversation.history.push(Exchange {
                        question: prompt,
                        answer,
                    });
                }
                return;
            }
            "error" => {
                let _ = tx.send(Event::Failed(event.data)).await;
                return;
            }
            _ => {}
        }
    }

    let _ = tx
        .send(Event::Failed("Stream ended before completion".to_string()))
        .await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::definition::Language;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ANSWER: &str = "event: youChatToken\n\
                          data: {\"youChatToken\":\"Rain is \"}\n\n\
                          event: youChatToken\n\
                          data: {\"youChatToken\":\"water.\"}\n\n\
                          event: done\n\
                          data: I'm done\n\n";

    fn sse(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream")
    }

    fn adapter(server: &MockServer) -> YouChatAdapter {
        YouChatAdapter::new(
            YouChatSettings {
                endpoint: format!("{}/api/streamingSearch", server.uri()),
            },
            Client::new(),
        )
    }

    #[tokio::test]
    async fn test_streams_tokens_and_records_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/streamingSearch"))
            .and(header("accept", "text/event-stream"))
            .and(query_param("domain", "youchat"))
            .respond_with(sse(ANSWER))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let request = DefinitionRequest::new("rain", Language::En);
        let fragments: Vec<String> = adapter.stream_definition(&request).collect().await;

        assert_eq!(fragments, vec!["Rain is ", "water."]);

        let conversation = adapter.conversation();
        assert_eq!(conversation.history.len(), 1);
        assert_eq!(conversation.history[0].question, request.prompt());
        assert_eq!(conversation.history[0].answer, "Rain is water.");
    }

    #[tokio::test]
    async fn test_history_is_sent_with_next_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("chat", "[]"))
            .respond_with(sse(ANSWER))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(sse(ANSWER))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let request = DefinitionRequest::new("rain", Language::En);
        let _: Vec<String> = adapter.stream_definition(&request).collect().await;
        let _: Vec<String> = adapter.stream_definition(&request).collect().await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let second_chat = requests[1]
            .url
            .query_pairs()
            .find(|(k, _)| k == "chat")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(second_chat.contains("Rain is water."));

        let first_id = requests[0].url.query_pairs().find(|(k, _)| k == "chatId");
        let second_id = requests[1].url.query_pairs().find(|(k, _)| k == "chatId");
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn test_missing_done_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(sse(
                "event: youChatToken\ndata: {\"youChatToken\":\"half\"}\n\n",
            ))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let request = DefinitionRequest::new("rain", Language::En);
        let fragments: Vec<String> = adapter.stream_definition(&request).collect().await;

        assert_eq!(fragments[0], "half");
        assert!(fragments[1].starts_with(ERROR_MARKER));
        assert!(adapter.conversation().history.is_empty());
    }

    #[tokio::test]
    async fn test_error_event_leaves_history_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(sse(ANSWER))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(sse(
                "event: youChatToken\ndata: {\"youChatToken\":\"Snow\"}\n\n\
                 event: error\ndata: rate limited\n\n",
            ))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let rain = DefinitionRequest::new("rain", Language::En);
        let _: Vec<String> = adapter.stream_definition(&rain).collect().await;

        let snow = DefinitionRequest::new("snow", Language::En);
        let fragments: Vec<String> = adapter.stream_definition(&snow).collect().await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], "Snow");
        assert!(fragments[1].starts_with(ERROR_MARKER));
        assert!(fragments[1].contains("rate limited"));

        let conversation = adapter.conversation();
        assert_eq!(conversation.history.len(), 1);
        assert_eq!(conversation.history[0].answer, "Rain is water.");
    }

    #[tokio::test]
    async fn test_http_failure_is_reported_in_band() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let request = DefinitionRequest::new("rain", Language::En);
        let fragments: Vec<String> = adapter(&server).stream_definition(&request).collect().await;

        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("HTTP error! status: 503"));
    }

    #[test]
    fn test_reset_conversation() {
        let adapter = YouChatAdapter::new(YouChatSettings::default(), Client::new());
        let before = adapter.conversation().chat_id;
        adapter.reset_conversation();
        assert_ne!(adapter.conversation().chat_id, before);
        assert!(adapter.conversation().history.is_empty());
    }
}
