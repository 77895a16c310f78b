//! Core agent loop implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::types::{TraceEntry, TraceEntryType};
use crate::config::{AgentConfig, Config};
use crate::llm::{ChatMessage, LlmClient, ModelTurn, OpenRouterClient, ToolCall};
use crate::tools::{
    truncate_chars, DuckDuckGoLite, FetchPageOutput, HttpPageFetcher, ToolRegistry,
    FETCH_PAGE_TOOL,
};

use super::conversation::ConversationState;
use super::prompt::{assemble_messages, build_system_prompt};
use super::AgentError;

/// Answer returned when a limit stops the run before the model answers.
pub const COULD_NOT_COMPLETE_ANSWER: &str =
    "I could not complete the research within the allowed number of steps.";

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer
    Answered,
    /// `max_iterations` model invocations were used up
    IterationLimit,
    /// The next tool request would exceed `max_tool_calls`
    ToolCallLimit,
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRun {
    pub answer: String,
    pub stop_reason: StopReason,
    /// Model invocations made
    pub steps: usize,
    /// Tool calls executed
    pub tool_calls: usize,
    /// URLs of pages fetched successfully, in first-read order
    pub consulted_urls: Vec<String>,
    pub trace: Vec<TraceEntry>,
    /// Full conversation: system, user, scratchpad, final answer
    pub messages: Vec<ChatMessage>,
}

/// The research agent.
///
/// Alternates strictly between one model call and the tool calls it asks
/// for. A failed tool becomes an observation, never an aborted run.
pub struct AgentLoop {
    config: AgentConfig,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
}

/// Mutable bookkeeping of a single run.
struct RunState {
    conversation: ConversationState,
    trace: Vec<TraceEntry>,
    tool_calls: usize,
    consulted_urls: Vec<String>,
}

impl AgentLoop {
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self { config, llm, tools }
    }

    /// Wire the production clients: chat completions, DuckDuckGo lite, HTTP fetch.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm = Arc::new(OpenRouterClient::with_base_url(
            config.api_key.clone(),
            config.llm_base_url.clone(),
            Duration::from_secs(config.llm_timeout_secs),
        )?);
        let tools = ToolRegistry::web(
            Arc::new(DuckDuckGoLite::new()?),
            Arc::new(HttpPageFetcher::new()?),
            &config.agent,
        );

        Ok(Self::new(config.agent.clone(), llm, tools))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Research `query` with the configured model.
    pub async fn run(&self, query: &str) -> Result<AgentRun, AgentError> {
        self.run_with_cancel(query, None, &CancellationToken::new())
            .await
    }

    /// Research `query`, optionally with another model, until answered,
    /// limited or `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError> {
        let model = model.unwrap_or(&self.config.model);
        let system_prompt = build_system_prompt(&self.config.system_prompt, &self.tools);
        let tool_schemas = self.tools.get_tool_schemas();

        let mut run = RunState {
            conversation: ConversationState::new(query),
            trace: Vec::new(),
            tool_calls: 0,
            consulted_urls: Vec::new(),
        };

        tracing::info!(model = %model, "Starting research run");

        for iteration in 0..self.config.max_iterations {
            let step = iteration + 1;
            tracing::debug!("Agent iteration {}", step);

            let messages = assemble_messages(
                &system_prompt,
                run.conversation.query(),
                run.conversation.history(),
            );

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.llm.chat_completion(
                    model,
                    &messages,
                    Some(tool_schemas.as_slice()),
                    self.config.temperature,
                ) => response.map_err(|e| AgentError::Llm(format!("{:#}", e)))?,
            };

            match ModelTurn::from(response) {
                ModelTurn::FinalAnswer(answer) => {
                    run.trace.push(TraceEntry::now(
                        TraceEntryType::Response,
                        truncate_for_log(&answer, 2000),
                    ));
                    run.conversation.record_answer(answer.clone());
                    tracing::info!(steps = step, tool_calls = run.tool_calls, "Research run answered");
                    return Ok(self.finish(run, &system_prompt, answer, StopReason::Answered, step));
                }
                ModelTurn::Empty => return Err(AgentError::EmptyResponse),
                ModelTurn::ToolRequest { content, calls } => {
                    if run.tool_calls + calls.len() > self.config.max_tool_calls {
                        tracing::warn!(
                            requested = calls.len(),
                            used = run.tool_calls,
                            "Tool call limit ({}) reached",
                            self.config.max_tool_calls
                        );
                        return Ok(self.fail_closed(run, &system_prompt, StopReason::ToolCallLimit, step));
                    }

                    let calls = run.conversation.record_tool_request(content, calls)?;
                    for tool_call in &calls {
                        self.step_tool_call(&mut run, tool_call, cancel).await?;
                    }
                }
            }
        }

        tracing::warn!("Max iterations ({}) reached without completion", self.config.max_iterations);
        let steps = self.config.max_iterations;
        Ok(self.fail_closed(run, &system_prompt, StopReason::IterationLimit, steps))
    }

    /// Execute one call and record its observation.
    async fn step_tool_call(
        &self,
        run: &mut RunState,
        tool_call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        run.tool_calls += 1;
        run.trace.push(TraceEntry::now(
            TraceEntryType::ToolCall,
            format!(
                "Calling tool: {} with args: {}",
                tool_call.function.name, tool_call.function.arguments
            ),
        ));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = self.execute_tool_call(tool_call) => result,
        };

        let observation = match result {
            Ok(output) => {
                run.trace.push(TraceEntry::now(
                    TraceEntryType::ToolResult,
                    truncate_for_log(&output, 1000),
                ));
                output
            }
            Err(e) => {
                tracing::warn!(tool = %tool_call.function.name, error = %e, "Tool call failed");
                run.trace.push(TraceEntry::now(
                    TraceEntryType::Error,
                    format!("{} failed: {}", tool_call.function.name, e),
                ));
                json!({"status": "error", "message": e.to_string()}).to_string()
            }
        };

        if tool_call.function.name == FETCH_PAGE_TOOL && fetched_ok(&observation) {
            if let Some(url) = call_argument(tool_call, "url") {
                if !run.consulted_urls.contains(&url) {
                    run.consulted_urls.push(url);
                }
            }
        }

        run.conversation
            .record_tool_result(&tool_call.id, observation)
    }

    /// Execute a single tool call.
    async fn execute_tool_call(&self, tool_call: &ToolCall) -> anyhow::Result<String> {
        let args: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
            .map_err(|e| anyhow::anyhow!("Invalid arguments for {}: {}", tool_call.function.name, e))?;

        tracing::debug!(tool = %tool_call.function.name, "Executing tool call");
        self.tools.execute(&tool_call.function.name, args).await
    }

    fn fail_closed(
        &self,
        mut run: RunState,
        system_prompt: &str,
        reason: StopReason,
        steps: usize,
    ) -> AgentRun {
        run.trace.push(TraceEntry::now(
            TraceEntryType::Error,
            format!("Stopped: {:?}", reason),
        ));
        self.finish(run, system_prompt, COULD_NOT_COMPLETE_ANSWER.to_string(), reason, steps)
    }

    fn finish(
        &self,
        run: RunState,
        system_prompt: &str,
        answer: String,
        stop_reason: StopReason,
        steps: usize,
    ) -> AgentRun {
        let messages = assemble_messages(
            system_prompt,
            run.conversation.query(),
            run.conversation.history(),
        );

        AgentRun {
            answer,
            stop_reason,
            steps,
            tool_calls: run.tool_calls,
            consulted_urls: run.consulted_urls,
            trace: run.trace,
            messages,
        }
    }
}

fn fetched_ok(observation: &str) -> bool {
    serde_json::from_str::<FetchPageOutput>(observation)
        .map(|output| output.is_success())
        .unwrap_or(false)
}

fn call_argument(tool_call: &ToolCall, key: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(&tool_call.function.arguments)
        .ok()?
        .get(key)?
        .as_str()
        .map(str::to_string)
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(s, max_chars);
    if truncated.len() == s.len() {
        truncated
    } else {
        format!("{}... [truncated]", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, ToolSchema};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays canned responses and records what it was sent.
    struct Scripted {
        responses: Mutex<VecDeque<ChatResponse>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: Option<&[ToolSchema]>,
            _temperature: f32,
        ) -> anyhow::Result<ChatResponse> {
            self.seen.lock().await.push(messages.to_vec());
            self.responses
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "search"
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, args: Value) -> anyhow::Result<String> {
            match args["query"].as_str() {
                Some("boom") => Err(anyhow::anyhow!("provider down")),
                Some(q) => Ok(format!("results for {}", q)),
                None => Err(anyhow::anyhow!("Missing 'query' argument")),
            }
        }
    }

    fn tools() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry
    }

    fn answer(text: &str) -> ChatResponse {
        ChatResponse {
            content: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn search(id: &str, query: &str) -> ChatResponse {
        ChatResponse {
            tool_calls: Some(vec![ToolCall::new(id, "search", json!({"query": query}))]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn answers_immediately_without_tools() {
        let llm = Scripted::new(vec![answer("42")]);
        let agent = AgentLoop::new(AgentConfig::default(), llm.clone(), tools());

        let run = agent.run("meaning of life").await.unwrap();
        assert_eq!(run.answer, "42");
        assert_eq!(run.stop_reason, StopReason::Answered);
        assert_eq!(run.steps, 1);
        assert_eq!(run.tool_calls, 0);

        let seen = llm.seen.lock().await;
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][1].content.as_deref(), Some("meaning of life"));
    }

    #[tokio::test]
    async fn n_tool_steps_then_answer_takes_n_plus_one_steps() {
        let llm = Scripted::new(vec![
            search("a", "one"),
            search("b", "two"),
            search("c", "three"),
            answer("done"),
        ]);
        let agent = AgentLoop::new(AgentConfig::default(), llm.clone(), tools());

        let run = agent.run("q").await.unwrap();
        assert_eq!(run.steps, 4);
        assert_eq!(run.tool_calls, 3);
        assert_eq!(run.answer, "done");

        // The last model call saw every observation.
        let seen = llm.seen.lock().await;
        let last = seen.last().unwrap();
        assert_eq!(last.len(), 2 + 3 * 2);
        assert_eq!(last[7].content.as_deref(), Some("results for three"));
    }

    #[tokio::test]
    async fn tool_failures_become_observations() {
        let llm = Scripted::new(vec![
            search("a", "boom"),
            ChatResponse {
                tool_calls: Some(vec![ToolCall::new("b", "no_such_tool", json!({}))]),
                ..Default::default()
            },
            answer("no information found"),
        ]);
        let agent = AgentLoop::new(AgentConfig::default(), llm, tools());

        let run = agent.run("q").await.unwrap();
        assert_eq!(run.answer, "no information found");

        let observations: Vec<Value> = run
            .messages
            .iter()
            .filter(|m| m.tool_call_id.is_some())
            .map(|m| serde_json::from_str(m.content.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0]["status"], "error");
        assert_eq!(observations[0]["message"], "provider down");
        assert!(observations[1]["message"]
            .as_str()
            .unwrap()
            .contains("Unknown tool"));
        assert!(run
            .trace
            .iter()
            .any(|e| e.entry_type == TraceEntryType::Error));
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_to_the_model() {
        let llm = Scripted::new(vec![
            ChatResponse {
                tool_calls: Some(vec![ToolCall {
                    id: "a".to_string(),
                    call_type: "function".to_string(),
                    function: crate::llm::FunctionCall {
                        name: "search".to_string(),
                        arguments: "{not json".to_string(),
                    },
                }]),
                ..Default::default()
            },
            answer("ok"),
        ]);
        let agent = AgentLoop::new(AgentConfig::default(), llm, tools());

        let run = agent.run("q").await.unwrap();
        let observation = run.messages[3].content.clone().unwrap();
        assert!(observation.contains("Invalid arguments for search"));
    }

    #[tokio::test]
    async fn iteration_cap_fails_closed() {
        let llm = Scripted::new((0..10).map(|i| search(&format!("c{}", i), "again")).collect());
        let config = AgentConfig {
            max_iterations: 3,
            ..AgentConfig::default()
        };
        let agent = AgentLoop::new(config, llm, tools());

        let run = agent.run("q").await.unwrap();
        assert_eq!(run.stop_reason, StopReason::IterationLimit);
        assert_eq!(run.answer, COULD_NOT_COMPLETE_ANSWER);
        assert_eq!(run.steps, 3);
        assert_eq!(run.tool_calls, 3);
    }

    #[tokio::test]
    async fn tool_call_cap_fails_closed_without_executing() {
        let llm = Scripted::new(vec![
            search("a", "one"),
            ChatResponse {
                tool_calls: Some(vec![
                    ToolCall::new("b", "search", json!({"query": "two"})),
                    ToolCall::new("c", "search", json!({"query": "three"})),
                ]),
                ..Default::default()
            },
        ]);
        let config = AgentConfig {
            max_tool_calls: 2,
            ..AgentConfig::default()
        };
        let agent = AgentLoop::new(config, llm, tools());

        let run = agent.run("q").await.unwrap();
        assert_eq!(run.stop_reason, StopReason::ToolCallLimit);
        assert_eq!(run.tool_calls, 1);
        assert_eq!(run.steps, 2);
        assert_eq!(run.answer, COULD_NOT_COMPLETE_ANSWER);
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let llm = Scripted::new(vec![ChatResponse::default()]);
        let agent = AgentLoop::new(AgentConfig::default(), llm, tools());

        assert!(matches!(
            agent.run("q").await,
            Err(AgentError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn llm_failure_is_an_error() {
        let llm = Scripted::new(vec![]);
        let agent = AgentLoop::new(AgentConfig::default(), llm, tools());

        match agent.run("q").await {
            Err(AgentError::Llm(message)) => assert!(message.contains("script exhausted")),
            other => panic!("unexpected: {:?}", other.map(|r| r.answer)),
        }
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_run() {
        let llm = Scripted::new(vec![answer("never")]);
        let agent = AgentLoop::new(AgentConfig::default(), llm, tools());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            agent.run_with_cancel("q", None, &cancel).await,
            Err(AgentError::Cancelled)
        ));
    }

    #[test]
    fn log_truncation_marks_cut_text() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc... [truncated]");
    }

    #[test]
    fn from_config_wires_production_clients() {
        let config = Config::new("key".to_string(), "test/model".to_string());
        let agent = AgentLoop::from_config(&config).unwrap();

        assert_eq!(agent.config().model, "test/model");
        let names: Vec<String> = agent.tools.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["search".to_string(), "fetch_page".to_string()]);
    }
}
