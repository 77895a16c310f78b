//! System prompt and per-step message assembly.

use crate::llm::ChatMessage;
use crate::tools::ToolRegistry;

/// Instructions for the research assistant role.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"## Your Role

Your role is to answer the user's question by researching web pages on the internet.

## Rules You Must Follow

1. Keep the answer as short as possible and summarize it.
2. If the answer gets long, break it into lines so it is easy to read.
3. At the end of the answer, after a line break, list the URLs of the pages you referred to."#;

/// Build the system prompt: the role instructions plus the tool list.
pub fn build_system_prompt(instructions: &str, tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    if tool_descriptions.is_empty() {
        return instructions.to_string();
    }

    format!(
        "{instructions}\n\n## Available Tools\n\n{tool_descriptions}\n\nSearch first, then read promising pages with fetch_page before answering. If a page cannot be downloaded, try another result.",
        instructions = instructions.trim_end(),
        tool_descriptions = tool_descriptions
    )
}

/// Messages for one model step: system, user question, then the scratchpad.
pub fn assemble_messages(system: &str, query: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.push(ChatMessage::user(query));
    messages.extend_from_slice(history);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ToolCall};
    use serde_json::json;

    #[test]
    fn system_prompt_without_tools_is_instructions() {
        let tools = ToolRegistry::new();
        assert_eq!(build_system_prompt("be brief", &tools), "be brief");
    }

    #[test]
    fn default_prompt_asks_for_sources() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("URLs"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("short"));
    }

    #[test]
    fn messages_are_system_user_then_history() {
        let history = vec![
            ChatMessage::assistant_tool_calls(
                None,
                vec![ToolCall::new("c1", "search", json!({"query": "q"}))],
            ),
            ChatMessage::tool_result("c1", "[]"),
        ];

        let messages = assemble_messages("sys", "what?", &history);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool]
        );
        assert_eq!(messages[0].content.as_deref(), Some("sys"));
        assert_eq!(messages[1].content.as_deref(), Some("what?"));
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("c1"));
    }
}
