//! Web search tool backed by a pluggable search provider.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::{Tool, SEARCH_TOOL};
use crate::config::{AgentConfig, SafeSearch};

const DDG_LITE_URL: &str = "https://lite.duckduckgo.com/lite/";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; WebAgent/0.1)";

/// One hit as the provider returned it. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSearchHit {
    pub title: Option<String>,
    pub body: Option<String>,
    pub href: Option<String>,
}

/// One search result as handed to the model. Fields are never missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl From<RawSearchHit> for SearchResult {
    fn from(hit: RawSearchHit) -> Self {
        Self {
            title: hit.title.unwrap_or_default(),
            snippet: hit.body.unwrap_or_default(),
            url: hit.href.unwrap_or_default(),
        }
    }
}

/// External search engine.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked text results for `query`. Providers may return more than
    /// `max_results`; callers truncate.
    async fn text(
        &self,
        query: &str,
        region: &str,
        safesearch: SafeSearch,
        max_results: usize,
    ) -> anyhow::Result<Vec<RawSearchHit>>;
}

/// DuckDuckGo's lite HTML frontend (no API key needed).
pub struct DuckDuckGoLite {
    endpoint: String,
    client: reqwest::Client,
}

impl DuckDuckGoLite {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_endpoint(DDG_LITE_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoLite {
    async fn text(
        &self,
        query: &str,
        region: &str,
        safesearch: SafeSearch,
        max_results: usize,
    ) -> anyhow::Result<Vec<RawSearchHit>> {
        let url = format!(
            "{}?q={}&kl={}&kp={}",
            self.endpoint,
            urlencoding::encode(query),
            urlencoding::encode(region),
            safesearch_param(safesearch)
        );

        tracing::debug!(query = %query, region = %region, "DuckDuckGo lite search");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("DuckDuckGo search error: {}", status));
        }

        let html = response.text().await?;
        Ok(parse_lite_results(&html, &self.endpoint, max_results))
    }
}

fn safesearch_param(safesearch: SafeSearch) -> &'static str {
    match safesearch {
        SafeSearch::Off => "-2",
        SafeSearch::Moderate => "-1",
        SafeSearch::Strict => "1",
    }
}

/// Extract ranked hits from a DuckDuckGo lite result page.
///
/// Titles are `a.result-link`; a `td.result-snippet` belongs to the link
/// before it, so results without a snippet row keep `body: None`.
/// Sponsored links (`/y.js` redirects) are skipped along with their snippets.
fn parse_lite_results(html: &str, endpoint: &str, max_results: usize) -> Vec<RawSearchHit> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result-link, td.result-snippet") else {
        return Vec::new();
    };
    let base = Url::parse(endpoint).ok();

    let mut hits: Vec<RawSearchHit> = Vec::new();
    // Set while the latest link was kept and has not received a snippet.
    let mut awaiting_snippet = false;

    for el in doc.select(&selector) {
        if el.value().name() == "a" {
            let href = el.value().attr("href").unwrap_or_default();
            if href.contains("/y.js") {
                awaiting_snippet = false;
                continue;
            }
            if hits.len() == max_results {
                break;
            }
            let title = collapse(&el.text().collect::<String>());
            hits.push(RawSearchHit {
                title: (!title.is_empty()).then_some(title),
                body: None,
                href: resolve_result_url(href, base.as_ref()),
            });
            awaiting_snippet = true;
        } else if awaiting_snippet {
            let snippet = collapse(&el.text().collect::<String>());
            if let Some(last) = hits.last_mut() {
                last.body = (!snippet.is_empty()).then_some(snippet);
            }
            awaiting_snippet = false;
        }
    }

    hits
}

/// Unwrap `//duckduckgo.com/l/?uddg=<target>` redirects and resolve relative links.
fn resolve_result_url(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let parsed = match base {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    };
    let Some(parsed) = parsed else {
        return Some(href.to_string());
    };

    if parsed.path().starts_with("/l/") {
        if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
            return Some(target.into_owned());
        }
    }
    Some(parsed.to_string())
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The `search` tool.
pub struct WebSearch {
    provider: Arc<dyn SearchProvider>,
    region: String,
    safesearch: SafeSearch,
    default_max_results: usize,
}

impl WebSearch {
    pub fn new(provider: Arc<dyn SearchProvider>, config: &AgentConfig) -> Self {
        Self {
            provider,
            region: config.region.clone(),
            safesearch: config.safesearch,
            default_max_results: config.default_max_results,
        }
    }

    /// Run a search and return at most `max_result_num` results.
    pub async fn search(
        &self,
        query: &str,
        max_result_num: usize,
    ) -> anyhow::Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(anyhow::anyhow!("'query' must not be empty"));
        }
        if max_result_num == 0 {
            return Err(anyhow::anyhow!("'max_result_num' must be a positive integer"));
        }

        let hits = self
            .provider
            .text(query, &self.region, self.safesearch, max_result_num)
            .await?;

        Ok(hits
            .into_iter()
            .take(max_result_num)
            .map(SearchResult::from)
            .collect())
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web. Returns a JSON list of results, each with title, snippet and url. Use it to find pages worth reading with fetch_page."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search keywords"
                },
                "max_result_num": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'query' argument"))?;
        let max_result_num = match &args["max_result_num"] {
            Value::Null => self.default_max_results,
            v => v
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("'max_result_num' must be a positive integer"))?
                as usize,
        };

        let results = self.search(query, max_result_num).await?;
        tracing::debug!(query = %query, results = results.len(), "search finished");

        Ok(serde_json::to_string(&results)?)
    }
}
