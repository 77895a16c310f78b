//! Tools the agent can call: web search and page fetch.

mod extract;
mod fetch;
mod search;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::AgentConfig;
use crate::llm::{FunctionSchema, ToolSchema};

pub use extract::{extract_main_content, html_to_text, truncate_chars, Extracted};
pub use fetch::{
    FetchError, FetchPage, FetchPageOutput, HttpPageFetcher, PageContent, PageFetcher, RawPage,
    DOWNLOAD_ERROR_MESSAGE, TIMEOUT_ERROR_MESSAGE, TIMEOUT_STATUS,
};
pub use search::{DuckDuckGoLite, RawSearchHit, SearchProvider, SearchResult, WebSearch};

pub const SEARCH_TOOL: &str = "search";
pub const FETCH_PAGE_TOOL: &str = "fetch_page";

/// A capability the model can invoke by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. The returned string is the observation shown to the model.
    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// Name and description, for prompts and listings.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Registry of available tools, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard toolset: `search` backed by `provider`, `fetch_page` backed by `fetcher`.
    pub fn web(
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: &AgentConfig,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WebSearch::new(provider, config)));
        registry.register(Arc::new(FetchPage::new(fetcher, config)));
        registry
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Function-calling declarations for the model.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                schema_type: "function".to_string(),
                function: FunctionSchema {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> anyhow::Result<String> {
        let tool = self
            .index
            .get(name)
            .map(|&slot| &self.tools[slot])
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;

        tool.execute(args).await
    }
}
