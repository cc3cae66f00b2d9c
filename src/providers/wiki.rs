use anyhow::{Context, Result, bail};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::DefinitionSource;
use crate::definition::{DefinitionRequest, FragmentStream, Language};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36";

/// Where and how the encyclopedia fallback fetches and replays extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSettings {
    pub zh_endpoint: String,
    pub en_endpoint: String,
    /// URL prefixes tried in order after the direct request fails.
    pub proxies: Vec<String>,
    pub timeout: Duration,
    pub slice_chars: usize,
    pub slice_delay: Duration,
}

impl Default for WikiSettings {
    fn default() -> Self {
        Self {
            zh_endpoint: "https://zh.wikipedia.org/w/api.php".to_string(),
            en_endpoint: "https://en.wikipedia.org/w/api.php".to_string(),
            proxies: vec![
                "https://api.allorigins.win/raw?url=".to_string(),
                "https://cors-anywhere.herokuapp.com/".to_string(),
                "https://proxy.cors.sh/".to_string(),
            ],
            timeout: Duration::from_secs(15),
            slice_chars: 30,
            slice_delay: Duration::from_millis(30),
        }
    }
}

impl WikiSettings {
    /// Chinese pages are used only for Chinese requests about a CJK topic.
    fn endpoint_for(&self, topic: &str, language: Language) -> &str {
        if language == Language::Zh && contains_cjk(topic) {
            &self.zh_endpoint
        } else {
            &self.en_endpoint
        }
    }
}

fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c))
}

#[derive(Debug, Deserialize)]
struct WikiResponse {
    query: Option<WikiQuery>,
}

#[derive(Debug, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    pages: HashMap<String, WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    extract: Option<String>,
}

/// Terminal fallback: an encyclopedia intro replayed in small slices.
///
/// Needs no credentials. Each route gets its own timeout and the first
/// route that answers with parseable JSON wins.
pub struct WikiAdapter {
    settings: WikiSettings,
    client: Client,
}

impl WikiAdapter {
    pub const fn new(settings: WikiSettings, client: Client) -> Self {
        Self { settings, client }
    }

    /// The direct request URL followed by one URL per proxy.
    fn routes(&self, request: &DefinitionRequest) -> Result<Vec<String>> {
        let endpoint = self.settings.endpoint_for(&request.topic, request.language);
        let direct = Url::parse_with_params(
            endpoint,
            &[
                ("action", "query"),
                ("format", "json"),
                ("titles", request.topic.as_str()),
                ("prop", "extracts"),
                ("exintro", "true"),
                ("explaintext", "true"),
                ("origin", "*"),
            ],
        )
        .with_context(|| format!("Invalid encyclopedia endpoint: {endpoint}"))?;

        let encoded = urlencoding::encode(direct.as_str());
        Ok(std::iter::once(direct.to_string())
            .chain(
                self.settings
                    .proxies
                    .iter()
                    .map(|proxy| format!("{proxy}{encoded}")),
            )
            .collect())
    }

    async fn fetch_extract(&self, request: &DefinitionRequest) -> Result<Option<String>> {
        let routes = self.routes(request)?;

        for (attempt, route) in routes.iter().enumerate() {
            match tokio::time::timeout(self.settings.timeout, fetch_json(&self.client, route)).await
            {
                Ok(Ok(response)) => return Ok(first_extract(response)),
                Ok(Err(e)) => tracing::warn!(attempt, error = %e, "encyclopedia route failed"),
                Err(_) => tracing::warn!(attempt, "encyclopedia route timed out"),
            }
        }

        bail!(request.language.wiki_unreachable(routes.len()))
    }
}

async fn fetch_json(client: &Client, url: &str) -> Result<WikiResponse> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await
        .context("Request failed")?;

    let status = response.status();
    if !status.is_success() {
        bail!("HTTP error! status: {}", status.as_u16());
    }

    let body = response.text().await.context("Failed to read response")?;
    serde_json::from_str(&body).context("Failed to parse encyclopedia response")
}

fn first_extract(response: WikiResponse) -> Option<String> {
    response
        .query?
        .pages
        .into_values()
        .find_map(|page| page.extract.filter(|e| !e.trim().is_empty()))
}

fn slices(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

impl DefinitionSource for WikiAdapter {
    fn name(&self) -> &'static str {
        "wiki"
    }

    fn stream_definition(&self, request: &DefinitionRequest) -> FragmentStream {
        let adapter = Self::new(self.settings.clone(), self.client.clone());
        let request = request.clone();

        Box::pin(async_stream::stream! {
            let content = match adapter.fetch_extract(&request).await {
                Ok(Some(extract)) => extract,
                Ok(None) => request.language.no_information(&request.topic),
                Err(e) => {
                    yield request.error_fragment(&format!("{e:#}"));
                    return;
                }
            };

            for (i, slice) in slices(&content, adapter.settings.slice_chars).into_iter().enumerate() {
                if i > 0 && !adapter.settings.slice_delay.is_zero() {
                    tokio::time::sleep(adapter.settings.slice_delay).await;
                }
                yield slice;
            }
        })
    }
}
