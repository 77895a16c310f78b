//! Per-run conversation state.

use std::collections::HashSet;

use super::AgentError;
use crate::llm::{ChatMessage, ToolCall};

/// The user's question plus the scratchpad of tool calls and observations.
///
/// Every tool result must answer a call recorded by the preceding tool
/// request, and each call is answered exactly once.
#[derive(Debug, Clone)]
pub struct ConversationState {
    query: String,
    history: Vec<ChatMessage>,
    pending: Vec<String>,
    used_ids: HashSet<String>,
}

impl ConversationState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
            pending: Vec::new(),
            used_ids: HashSet::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Record an assistant turn requesting `calls`.
    ///
    /// Empty or repeated call ids are replaced so results can be matched
    /// unambiguously; the returned calls carry the ids actually recorded.
    pub fn record_tool_request(
        &mut self,
        content: Option<String>,
        calls: Vec<ToolCall>,
    ) -> Result<Vec<ToolCall>, AgentError> {
        if let Some(id) = self.pending.first() {
            return Err(AgentError::UnansweredToolCall(id.clone()));
        }

        let mut recorded = Vec::with_capacity(calls.len());
        for mut call in calls {
            if call.id.is_empty() || self.used_ids.contains(&call.id) {
                call.id = self.fresh_id();
            }
            self.used_ids.insert(call.id.clone());
            self.pending.push(call.id.clone());
            recorded.push(call);
        }

        self.history
            .push(ChatMessage::assistant_tool_calls(content, recorded.clone()));
        Ok(recorded)
    }

    /// Record the observation for the pending call `call_id`.
    pub fn record_tool_result(
        &mut self,
        call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), AgentError> {
        let slot = self
            .pending
            .iter()
            .position(|id| id == call_id)
            .ok_or_else(|| AgentError::UnmatchedToolResult(call_id.to_string()))?;
        self.pending.remove(slot);

        self.history.push(ChatMessage::tool_result(call_id, content));
        Ok(())
    }

    pub fn record_answer(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::assistant(text));
    }

    fn fresh_id(&self) -> String {
        let mut n = self.used_ids.len();
        loop {
            let id = format!("call_{}", n);
            if !self.used_ids.contains(&id) {
                return id;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "search", json!({"query": "q"}))
    }

    #[test]
    fn results_must_match_a_pending_call() {
        let mut state = ConversationState::new("q");
        assert!(matches!(
            state.record_tool_result("ghost", "x"),
            Err(AgentError::UnmatchedToolResult(id)) if id == "ghost"
        ));

        state.record_tool_request(None, vec![call("a")]).unwrap();
        state.record_tool_result("a", "ok").unwrap();
        assert!(state.record_tool_result("a", "again").is_err());
        assert_eq!(state.history().len(), 2);
    }

    #[test]
    fn new_request_requires_previous_results() {
        let mut state = ConversationState::new("q");
        state
            .record_tool_request(None, vec![call("a"), call("b")])
            .unwrap();
        state.record_tool_result("b", "ok").unwrap();

        assert!(matches!(
            state.record_tool_request(None, vec![call("c")]),
            Err(AgentError::UnansweredToolCall(id)) if id == "a"
        ));
    }

    #[test]
    fn empty_and_duplicate_ids_are_replaced() {
        let mut state = ConversationState::new("q");
        let calls = state
            .record_tool_request(None, vec![call(""), call("x"), call("x")])
            .unwrap();

        let ids: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("x"));
        assert!(calls.iter().all(|c| !c.id.is_empty()));

        let recorded = state.history()[0].tool_calls.clone().unwrap();
        assert_eq!(recorded, calls);
    }
}
