//! External search tier.
//!
//! Queries a text search provider once per bookmaker, in order, and runs
//! the returned prose through the extractor until a bookmaker yields both
//! moneylines. Two providers are available: Serper (Google results as JSON)
//! and Anthropic's web search tool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{extract, OddsSource, Pacer};
use crate::types::{Matchup, OddsQuote, SourceTier};

pub const DEFAULT_BOOKMAKERS: [&str; 5] = ["draftkings", "fanduel", "betmgm", "caesars", "bet365"];

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

const USER_AGENT: &str = concat!("mafs/", env!("CARGO_PKG_VERSION"));

/// Free-text search returning raw result text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

pub struct ExternalSearchTier {
    provider: Arc<dyn SearchProvider>,
    provider_name: String,
    bookmakers: Vec<String>,
}

impl ExternalSearchTier {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider_name: provider.name().to_string(),
            provider,
            bookmakers: DEFAULT_BOOKMAKERS.iter().map(|b| b.to_string()).collect(),
        }
    }

    pub fn with_bookmakers(mut self, bookmakers: Vec<String>) -> Self {
        if !bookmakers.is_empty() {
            self.bookmakers = bookmakers;
        }
        self
    }

    pub fn query_for(matchup: &Matchup, bookmaker: &str) -> String {
        format!("{} vs {} odds {}", matchup.fighter_a, matchup.fighter_b, bookmaker)
    }
}

#[async_trait]
impl OddsSource for ExternalSearchTier {
    fn tier(&self) -> SourceTier {
        SourceTier::External
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn lookup(&self, matchup: &Matchup, pacer: &Pacer) -> Result<Option<OddsQuote>> {
        pacer.wait().await;

        for bookmaker in &self.bookmakers {
            let query = Self::query_for(matchup, bookmaker);
            debug!(provider = %self.provider_name, %bookmaker, %query, "Searching for odds");

            let text = match self.provider.search(&query).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(provider = %self.provider_name, %bookmaker, error = %e, "Search failed, trying next bookmaker");
                    continue;
                }
            };

            if let Some(mut quote) = extract::extract(&text, &matchup.fighter_a, &matchup.fighter_b) {
                quote.provenance = bookmaker.clone();
                info!(%matchup, %bookmaker, odds = %quote, "Found odds via search");
                return Ok(Some(quote));
            }
            debug!(%bookmaker, chars = text.len(), "No odds in search text");
        }

        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build search HTTP client")
}

/// Send with retry and exponential backoff on 429 / 5xx / transport errors.
async fn send_with_retry<F>(label: &str, build: F) -> Result<reqwest::Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
            debug!(provider = label, attempt, delay_ms = delay, "Retrying search request");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let error_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(provider = label, status = %status, attempt, "Retryable search error");
                    last_error = Some(format!("HTTP {status}: {error_text}"));
                    continue;
                }
                anyhow::bail!("{label} error {status}: {error_text}");
            }
            Err(e) => {
                warn!(provider = label, attempt, error = %e, "Search request failed");
                last_error = Some(format!("Request error: {e}"));
            }
        }
    }

    anyhow::bail!(
        "{label} failed after {MAX_RETRIES} retries: {}",
        last_error.unwrap_or_default()
    )
}

// ---------------------------------------------------------------------------
// Serper
// ---------------------------------------------------------------------------

const SERPER_URL: &str = "https://google.serper.dev/search";

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Debug, Default, Deserialize)]
struct SerperResponse {
    #[serde(default, rename = "answerBox")]
    answer_box: Option<SerperSnippet>,
    #[serde(default)]
    organic: Vec<SerperSnippet>,
}

#[derive(Debug, Default, Deserialize)]
struct SerperSnippet {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

impl SerperResponse {
    /// One line per title/snippet so the extractor's line scan sees each
    /// result separately.
    fn into_text(self) -> String {
        self.answer_box
            .into_iter()
            .chain(self.organic)
            .flat_map(|s| [s.answer, s.title, s.snippet])
            .flatten()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SerperSearch {
    http: Client,
    api_key: SecretString,
}

impl SerperSearch {
    pub fn new(api_key: SecretString) -> Result<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(20))?,
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let body = SerperRequest { q: query, num: 10 };
        let response = send_with_retry("serper", || {
            self.http
                .post(SERPER_URL)
                .header("X-API-KEY", self.api_key.expose_secret())
                .json(&body)
        })
        .await?;

        let parsed: SerperResponse = response
            .json()
            .await
            .context("Failed to parse Serper response")?;
        Ok(parsed.into_text())
    }

    fn name(&self) -> &str {
        "serper"
    }
}

// ---------------------------------------------------------------------------
// Anthropic web search
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    tools: Vec<WebSearchTool>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Uses the Messages API with the server-side `web_search` tool and
/// returns the model's text blocks.
pub struct AnthropicSearch {
    http: Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicSearch {
    pub fn new(api_key: SecretString, model: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(120))?,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    fn prompt(query: &str) -> String {
        format!(
            "Search for current betting odds for this fight: \"{query}\". \
             I need moneyline odds for both fighters and the over/under total \
             rounds line if available. List each fighter on its own line with \
             their American odds."
        )
    }
}

#[async_trait]
impl SearchProvider for AnthropicSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            tools: vec![WebSearchTool {
                tool_type: "web_search_20250305",
                name: "web_search",
            }],
            messages: vec![Message {
                role: "user",
                content: Self::prompt(query),
            }],
        };

        let response = send_with_retry("anthropic", || {
            self.http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
        })
        .await?;

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        Ok(body
            .content
            .iter()
            .filter(|b| b.content_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn tier_with(mock: MockSearchProvider) -> ExternalSearchTier {
        ExternalSearchTier::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_first_bookmaker_with_odds_wins() {
        let mut mock = MockSearchProvider::new();
        mock.expect_name().times(1).return_const("mock".to_string());
        mock.expect_search()
            .with(eq("Jon Jones vs Stipe Miocic odds draftkings"))
            .times(1)
            .returning(|_| Ok("Jon Jones -250\nStipe Miocic +200".to_string()));

        let q = tier_with(mock)
            .lookup(&Matchup::new("Jon Jones", "Stipe Miocic"), &Pacer::unpaced())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((q.moneyline_a, q.moneyline_b), (-250, 200));
        assert_eq!(q.provenance, "draftkings");
        assert_eq!(q.source_tier, SourceTier::External);
    }

    #[tokio::test]
    async fn test_errors_and_empty_text_advance_bookmaker() {
        let mut mock = MockSearchProvider::new();
        mock.expect_name().times(1).return_const("mock".to_string());
        mock.expect_search()
            .with(eq("A vs B odds draftkings"))
            .returning(|_| Err(anyhow::anyhow!("timeout")));
        mock.expect_search()
            .with(eq("A vs B odds fanduel"))
            .returning(|_| Ok("nothing useful here".to_string()));
        mock.expect_search()
            .with(eq("A vs B odds betmgm"))
            .returning(|_| Ok("a +120\nb \u{2212}140".to_string()));

        let q = tier_with(mock)
            .lookup(&Matchup::new("A", "B"), &Pacer::unpaced())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(q.provenance, "betmgm");
        assert_eq!((q.moneyline_a, q.moneyline_b), (120, -140));
    }

    #[tokio::test]
    async fn test_all_bookmakers_miss() {
        let mut mock = MockSearchProvider::new();
        mock.expect_name().times(1).return_const("mock".to_string());
        mock.expect_search()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("503")));

        let tier = tier_with(mock).with_bookmakers(vec!["one".into(), "two".into()]);
        let out = tier
            .lookup(&Matchup::new("A", "B"), &Pacer::unpaced())
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_serper_response_flattens_to_lines() {
        let json = r#"{
            "answerBox": {"answer": "Jones -250"},
            "organic": [
                {"title": "UFC odds", "snippet": "Miocic +200"},
                {"title": "Other"}
            ]
        }"#;
        let parsed: SerperResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_text(), "Jones -250\nUFC odds\nMiocic +200\nOther");
    }

    #[test]
    fn test_query_format() {
        assert_eq!(
            ExternalSearchTier::query_for(&Matchup::new("A", "B"), "bet365"),
            "A vs B odds bet365"
        );
    }
}
