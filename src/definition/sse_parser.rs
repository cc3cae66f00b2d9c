//! `data: ` line protocol shared by every chat-style adapter.
//!
//! HTTP adapters receive these lines from the response body; the WebSocket
//! adapter synthesizes them from its JSON frames so both go through the same
//! parsing and batching code.

use anyhow::Result;
use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

pub const DONE_LINE: &str = "data: [DONE]";

/// A meaningful line of a chat completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Delta(String),
    Done,
}

#[derive(Debug, Deserialize, Serialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize, Serialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize, Serialize)]
struct Delta {
    content: Option<String>,
}

/// Converts a raw byte stream into parsed lines, stopping after `[DONE]`.
///
/// Transport errors are yielded as `Err` and end the stream. Lines that are
/// not `data: ` lines, or whose JSON does not parse, are skipped.
pub fn sse_to_line_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<SseLine>> + Send {
    async_stream::stream! {
        use futures_util::StreamExt;

        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {e}"));
                    return;
                }
            };

            buffer.extend_from_slice(&chunk);

            // Only complete lines are decoded; a chunk may end inside a multi-byte char.
            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw);

                match parse_sse_line(line.trim()) {
                    Some(SseLine::Done) => {
                        yield Ok(SseLine::Done);
                        return;
                    }
                    Some(delta) => yield Ok(delta),
                    None => {}
                }
            }
        }

        if let Some(delta) = parse_sse_line(String::from_utf8_lossy(&buffer).trim()) {
            yield Ok(delta);
        }
    }
}

/// Parses a single trimmed line.
///
/// Returns `None` for non-data lines, empty content and malformed JSON.
pub fn parse_sse_line(line: &str) -> Option<SseLine> {
    let json_str = line.strip_prefix("data: ")?;

    if json_str.trim() == "[DONE]" {
        return Some(SseLine::Done);
    }

    let Ok(response) = serde_json::from_str::<StreamResponse>(json_str) else {
        tracing::debug!(line = json_str, "skipping malformed stream frame");
        return None;
    };

    let content: String = response
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .collect();

    if content.is_empty() {
        None
    } else {
        Some(SseLine::Delta(content))
    }
}

/// Formats `content` as a chat completion delta line.
pub fn delta_line(content: &str) -> String {
    let response = StreamResponse {
        choices: vec![StreamChoice {
            delta: Delta {
                content: Some(content.to_string()),
            },
        }],
    };
    // Serializing a struct of strings cannot fail.
    let json = serde_json::to_string(&response).unwrap_or_default();
    format!("data: {json}")
}

/// Groups small deltas into fragments of at least `threshold` chars.
///
/// A threshold of 0 passes every delta through unchanged.
#[derive(Debug, Default)]
pub struct DeltaBatcher {
    threshold: usize,
    pending: String,
}

impl DeltaBatcher {
    pub const fn new(threshold: usize) -> Self {
        Self {
            threshold,
            pending: String::new(),
        }
    }

    /// Adds a delta and returns a fragment once the threshold is reached.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.pending.push_str(delta);
        if self.pending.chars().count() >= self.threshold.max(1) {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Returns whatever is still buffered.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn delta(s: &str) -> Option<SseLine> {
        Some(SseLine::Delta(s.to_string()))
    }

    #[test]
    fn test_parse_sse_line_with_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_sse_line(line), delta("Hello"));
    }

    #[test]
    fn test_parse_sse_line_with_empty_content() {
        let line = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(line), None);
    }

    #[test]
    fn test_parse_sse_line_with_null_content() {
        let line = r#"data: {"choices":[{"delta":{}}]}"#;
        assert_eq!(parse_sse_line(line), None);
    }

    #[test]
    fn test_parse_sse_line_multiple_choices() {
        let line =
            r#"data: {"choices":[{"delta":{"content":"Hello"}},{"delta":{"content":" World"}}]}"#;
        assert_eq!(parse_sse_line(line), delta("Hello World"));
    }

    #[test]
    fn test_parse_sse_line_invalid_json() {
        assert_eq!(parse_sse_line("data: not json"), None);
    }

    #[test]
    fn test_parse_sse_line_done_marker() {
        assert_eq!(parse_sse_line(DONE_LINE), Some(SseLine::Done));
    }

    #[test]
    fn test_parse_sse_line_comment() {
        assert_eq!(parse_sse_line(": keep-alive"), None);
    }

    #[test]
    fn test_delta_line_parses_back() {
        let line = delta_line("量子 \"quoted\"");
        assert_eq!(parse_sse_line(&line), delta("量子 \"quoted\""));
    }

    #[test]
    fn test_batcher_holds_until_threshold() {
        let mut batcher = DeltaBatcher::new(5);
        assert_eq!(batcher.push("ab"), None);
        assert_eq!(batcher.push("cd"), None);
        assert_eq!(batcher.push("e"), Some("abcde".to_string()));
        assert_eq!(batcher.flush(), None);
    }

    #[test]
    fn test_batcher_counts_chars_not_bytes() {
        let mut batcher = DeltaBatcher::new(3);
        assert_eq!(batcher.push("量子"), None);
        assert_eq!(batcher.push("力"), Some("量子力".to_string()));
    }

    #[test]
    fn test_batcher_zero_threshold_passes_through() {
        let mut batcher = DeltaBatcher::new(0);
        assert_eq!(batcher.push("a"), Some("a".to_string()));
    }

    #[test]
    fn test_batcher_flush_returns_remainder() {
        let mut batcher = DeltaBatcher::new(40);
        batcher.push("tail");
        assert_eq!(batcher.flush(), Some("tail".to_string()));
        assert_eq!(batcher.flush(), None);
    }

    #[tokio::test]
    async fn test_line_stream_splits_across_chunks() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"con")),
            Ok(Bytes::from("tent\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n")),
            Ok(Bytes::from("data: not json\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")),
        ];
        let lines: Vec<SseLine> = sse_to_line_stream(futures_util::stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            lines,
            vec![
                SseLine::Delta("Hel".to_string()),
                SseLine::Delta("lo".to_string()),
                SseLine::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_line_stream_keeps_chars_split_across_chunks() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"雨是水\"}}]}\n\ndata: [DONE]\n\n";
        let cut = body.find('雨').unwrap() + 1;
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::copy_from_slice(&body.as_bytes()[..cut])),
            Ok(Bytes::copy_from_slice(&body.as_bytes()[cut..])),
        ];
        let lines: Vec<SseLine> = sse_to_line_stream(futures_util::stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            lines,
            vec![SseLine::Delta("雨是水".to_string()), SseLine::Done]
        );
    }
}
