//! Agent module - the research loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt and the user's question
//! 2. Call LLM with the search and fetch tools
//! 3. If LLM requests tool calls, execute them and feed the observations back
//! 4. Repeat until LLM produces a final answer or a step limit is reached

mod agent_loop;
mod conversation;
mod prompt;

use thiserror::Error;

pub use agent_loop::{AgentLoop, AgentRun, StopReason, COULD_NOT_COMPLETE_ANSWER};
pub use conversation::ConversationState;
pub use prompt::{assemble_messages, build_system_prompt, DEFAULT_SYSTEM_PROMPT};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("LLM returned empty response")]
    EmptyResponse,

    #[error("tool result does not answer a pending call: {0}")]
    UnmatchedToolResult(String),

    #[error("tool call {0} has no result yet")]
    UnansweredToolCall(String),

    #[error("run cancelled")]
    Cancelled,
}
