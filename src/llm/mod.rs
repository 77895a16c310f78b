//! Language-model boundary.
//!
//! Messages and tool calls follow the OpenAI chat-completions wire format so
//! any compatible endpoint (OpenRouter, OpenAI, local gateways) can be used.

mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openrouter::{OpenRouterClient, OPENROUTER_API_URL};

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn that requests tool calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Observation answering the tool call `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A structured tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,

    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,

    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

fn function_type() -> String {
    "function".to_string()
}

/// Function name plus JSON-encoded arguments, as sent by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Tool declaration offered to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The assistant message of a completion.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<String>,
}

/// What the model decided to do this step.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Plain text with no tool call: the run is over.
    FinalAnswer(String),
    /// One or more tools to run before the next step. Any text the model sent
    /// alongside the calls is kept for the conversation.
    ToolRequest {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// Neither text nor tool calls.
    Empty,
}

impl From<ChatResponse> for ModelTurn {
    fn from(response: ChatResponse) -> Self {
        match response.tool_calls {
            Some(calls) if !calls.is_empty() => ModelTurn::ToolRequest {
                content: response.content.filter(|c| !c.trim().is_empty()),
                calls,
            },
            _ => match response.content {
                Some(text) if !text.trim().is_empty() => ModelTurn::FinalAnswer(text),
                _ => ModelTurn::Empty,
            },
        }
    }
}

/// A chat-completions backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
        temperature: f32,
    ) -> anyhow::Result<ChatResponse>;
}
