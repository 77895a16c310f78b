//! Page fetch tool: download a URL and return its readable text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::extract::{extract_main_content, html_to_text, truncate_chars, Extracted};
use super::{Tool, FETCH_PAGE_TOOL};
use crate::config::AgentConfig;

/// Status reported when the download timed out.
pub const TIMEOUT_STATUS: u16 = 500;

pub const TIMEOUT_ERROR_MESSAGE: &str =
    "Could not download page due to Timeout Error. Please try to fetch other pages.";

pub const DOWNLOAD_ERROR_MESSAGE: &str =
    "Could not download page. Please try to fetch other pages.";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; WebAgent/0.1)";

/// Raw HTTP response: status code and body decoded as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Network(String),
}

/// Network boundary of the fetch tool: one GET per call.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawPage, FetchError>;
}

/// `reqwest`-backed fetcher.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawPage, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Network(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();

        // Decode as UTF-8 whatever the declared charset.
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(RawPage {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Tool output: HTTP-ish status plus either page text or an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPageOutput {
    pub status: u16,
    pub page_content: PageContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageContent {
    Page {
        title: String,
        content: String,
        /// Always false: pages are not split into chunks.
        has_next: bool,
    },
    Error {
        error_message: String,
    },
}

impl FetchPageOutput {
    pub fn page(title: String, content: String) -> Self {
        Self {
            status: 200,
            page_content: PageContent::Page {
                title,
                content,
                has_next: false,
            },
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            page_content: PageContent::Error {
                error_message: message.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.page_content, PageContent::Page { .. })
    }
}

/// The `fetch_page` tool.
pub struct FetchPage {
    fetcher: Arc<dyn PageFetcher>,
    default_timeout_secs: u64,
    char_budget: usize,
}

impl FetchPage {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &AgentConfig) -> Self {
        Self {
            fetcher,
            default_timeout_secs: config.default_fetch_timeout_secs,
            char_budget: config.content_char_budget,
        }
    }

    /// Download `url` and extract its main text. Never fails: download
    /// problems come back as an error-shaped output.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> FetchPageOutput {
        let page = match self.fetcher.get(url, timeout).await {
            Ok(page) => page,
            Err(FetchError::Timeout(_)) => {
                tracing::warn!(url = %url, "page fetch timed out");
                return FetchPageOutput::error(TIMEOUT_STATUS, TIMEOUT_ERROR_MESSAGE);
            }
            Err(FetchError::Network(e)) => {
                tracing::warn!(url = %url, error = %e, "page fetch failed");
                return FetchPageOutput::error(500, DOWNLOAD_ERROR_MESSAGE);
            }
        };

        if page.status != 200 {
            tracing::debug!(url = %url, status = page.status, "page fetch returned non-200");
            return FetchPageOutput::error(page.status, DOWNLOAD_ERROR_MESSAGE);
        }

        render_page(url, extract_main_content(&page.body), self.char_budget)
    }
}

/// Text output for an extracted page. A page that cannot be rendered to
/// text is reported like a failed download.
fn render_page(url: &str, extracted: Extracted, char_budget: usize) -> FetchPageOutput {
    match html_to_text(&extracted.html) {
        Ok(text) => FetchPageOutput::page(extracted.title, truncate_chars(&text, char_budget)),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "page text conversion failed");
            FetchPageOutput::error(500, DOWNLOAD_ERROR_MESSAGE)
        }
    }
}

#[async_trait]
impl Tool for FetchPage {
    fn name(&self) -> &str {
        FETCH_PAGE_TOOL
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its main text. Returns JSON with the HTTP status and page_content (title, content, has_next). On errors page_content holds error_message; try another page in that case."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "page_num": {
                    "type": "integer",
                    "description": "Page of the content to read (default: 0)"
                },
                "timeout_sec": {
                    "type": "integer",
                    "description": "Download timeout in seconds (default: 10)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;
        // Accepted for forward compatibility; content is never paginated.
        let _page_num = args["page_num"].as_u64().unwrap_or(0);
        let timeout_secs = match &args["timeout_sec"] {
            Value::Null => self.default_timeout_secs,
            v => v
                .as_u64()
                .filter(|&secs| secs > 0)
                .ok_or_else(|| anyhow::anyhow!("'timeout_sec' must be a positive integer"))?,
        };

        let output = self.fetch(url, Duration::from_secs(timeout_secs)).await;
        Ok(serde_json::to_string(&output)?)
    }
}
