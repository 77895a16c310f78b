//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::StopReason;

/// Request to research a question.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    /// The user's question
    pub query: String,

    /// Optional model override (uses default if not specified)
    pub model: Option<String>,
}

/// Result of one agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    /// Unique run identifier
    pub id: Uuid,

    /// Final answer text
    pub answer: String,

    /// Why the run stopped
    pub stop_reason: StopReason,

    /// Model invocations made
    pub steps: usize,

    /// Tool calls executed
    pub tool_calls: usize,

    /// Pages successfully read during the run
    pub consulted_urls: Vec<String>,

    /// Tool traffic and final response
    pub trace: Vec<TraceEntry>,
}

/// A single entry in the run trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Entry type
    pub entry_type: TraceEntryType,

    /// Content of the entry
    pub content: String,
}

impl TraceEntry {
    pub fn now(entry_type: TraceEntryType, content: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            entry_type,
            content: content.into(),
        }
    }
}

/// Types of trace entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEntryType {
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Agent produced final response
    Response,
    /// A tool or limit error occurred
    Error,
}

/// Error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Default model for runs
    pub model: String,
}
