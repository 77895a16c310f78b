//! Configuration management for the web agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. API key for the chat-completions endpoint.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. The LLM model to use. Defaults to `openai/gpt-4o-mini`.
//! - `LLM_TIMEOUT_SECS` - Optional. Timeout for a single model request. Defaults to `120`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `MAX_ITERATIONS` - Optional. Maximum model invocations per run. Defaults to `10`.
//! - `MAX_TOOL_CALLS` - Optional. Maximum tool calls per run. Defaults to `20`.
//! - `SEARCH_REGION` - Optional. Search locale. Defaults to `jp-jp`.
//! - `SEARCH_SAFESEARCH` - Optional. `off`, `moderate` or `strict`. Defaults to `off`.
//! - `FETCH_TIMEOUT_SECS` - Optional. Default page fetch timeout. Defaults to `10`.
//! - `CONTENT_CHAR_BUDGET` - Optional. Characters kept from a fetched page. Defaults to `3000`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::agent::DEFAULT_SYSTEM_PROMPT;
use crate::llm::OPENROUTER_API_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Safe-search policy passed to the search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafeSearch {
    #[default]
    Off,
    Moderate,
    Strict,
}

impl FromStr for SafeSearch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "moderate" => Ok(Self::Moderate),
            "strict" | "on" => Ok(Self::Strict),
            other => Err(format!("expected off, moderate or strict, got: {}", other)),
        }
    }
}

impl fmt::Display for SafeSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Moderate => write!(f, "moderate"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// Everything one agent run needs to know besides its clients.
///
/// Built once and handed to [`crate::agent::AgentLoop`] at construction.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Fixed system instruction block
    pub system_prompt: String,

    /// Model identifier sent to the chat-completions endpoint
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Search locale (provider region code)
    pub region: String,

    /// Search safety policy
    pub safesearch: SafeSearch,

    /// Result count used when the model does not pass `max_result_num`
    pub default_max_results: usize,

    /// Fetch timeout used when the model does not pass `timeout_sec`
    pub default_fetch_timeout_secs: u64,

    /// Characters of extracted page text handed back to the model
    pub content_char_budget: usize,

    /// Maximum model invocations per run
    pub max_iterations: usize,

    /// Maximum tool calls per run
    pub max_tool_calls: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            temperature: 0.0,
            region: "jp-jp".to_string(),
            safesearch: SafeSearch::Off,
            default_max_results: 5,
            default_fetch_timeout_secs: 10,
            content_char_budget: 3000,
            max_iterations: 10,
            max_tool_calls: 20,
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the chat-completions endpoint
    pub api_key: String,

    /// OpenAI-compatible base URL (without `/chat/completions`)
    pub llm_base_url: String,

    /// Timeout for one model request, in seconds
    pub llm_timeout_secs: u64,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Agent behaviour
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparsable numbers or policies.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let llm_base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| OPENROUTER_API_URL.to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let defaults = AgentConfig::default();
        let agent = AgentConfig {
            model: std::env::var("DEFAULT_MODEL").unwrap_or(defaults.model),
            region: std::env::var("SEARCH_REGION").unwrap_or(defaults.region),
            safesearch: parse_env("SEARCH_SAFESEARCH", defaults.safesearch)?,
            default_fetch_timeout_secs: parse_env(
                "FETCH_TIMEOUT_SECS",
                defaults.default_fetch_timeout_secs,
            )?,
            content_char_budget: parse_env("CONTENT_CHAR_BUDGET", defaults.content_char_budget)?,
            max_iterations: parse_env("MAX_ITERATIONS", defaults.max_iterations)?,
            max_tool_calls: parse_env("MAX_TOOL_CALLS", defaults.max_tool_calls)?,
            ..defaults
        };

        if agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            llm_base_url,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 120)?,
            host,
            port: parse_env("PORT", 3000)?,
            agent,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            llm_base_url: OPENROUTER_API_URL.to_string(),
            llm_timeout_secs: 120,
            host: "127.0.0.1".to_string(),
            port: 3000,
            agent: AgentConfig {
                model,
                ..AgentConfig::default()
            },
        }
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
