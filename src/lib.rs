//! # Web Agent
//!
//! A web-browsing research agent: it searches the web, reads the most
//! promising pages and answers with a short summary that cites its sources.
//!
//! This library provides:
//! - A tool-based agent loop (`agent`) over an OpenAI-compatible LLM (`llm`)
//! - A `search` tool (DuckDuckGo lite) and a `fetch_page` tool with
//!   readability-style text extraction (`tools`)
//! - An HTTP API to submit questions (`api`)
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Build context with system prompt and the user's question
//! 2. Call LLM, parse response, execute any tool calls
//! 3. Feed observations back to LLM, repeat until it answers
//! 4. Stop early, failing closed, when the step or tool-call limit is hit
//!
//! ## Example
//!
//! ```rust,ignore
//! use web_agent::{agent::AgentLoop, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = AgentLoop::from_config(&config)?;
//! let run = agent.run("Who won the 2024 Australian Open men's singles?").await?;
//! println!("{}", run.answer);
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
