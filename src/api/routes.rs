//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::{AskRequest, AskResponse, ErrorResponse, HealthResponse};
use crate::agent::AgentLoop;
use crate::config::Config;

/// Shared application state.
pub struct AppState {
    pub agent: AgentLoop,
    /// Cancelled on shutdown so in-flight runs stop.
    pub shutdown: CancellationToken,
}

/// Build the router around an already-wired agent.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ask", post(ask))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let agent = AgentLoop::from_config(&config)?;
    let shutdown = CancellationToken::new();
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState {
        agent,
        shutdown: shutdown.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.agent.config().model.clone(),
    })
}

async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Response {
    let query = req.query.trim();
    if query.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query must not be empty".to_string());
    }

    let id = Uuid::new_v4();
    tracing::info!(%id, "Research request received");

    let cancel = state.shutdown.child_token();
    match state
        .agent
        .run_with_cancel(query, req.model.as_deref(), &cancel)
        .await
    {
        Ok(run) => Json(AskResponse {
            id,
            answer: run.answer,
            stop_reason: run.stop_reason,
            steps: run.steps,
            tool_calls: run.tool_calls,
            consulted_urls: run.consulted_urls,
            trace: run.trace,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(%id, error = %e, "Research run failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::llm::{ChatMessage, ChatResponse, LlmClient, ToolSchema};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmClient for Fixed {
        async fn chat_completion(
            &self,
            model: &str,
            _messages: &[ChatMessage],
            _tools: Option<&[ToolSchema]>,
            _temperature: f32,
        ) -> anyhow::Result<ChatResponse> {
            Ok(ChatResponse {
                content: Some(format!("{} ({})", self.0, model)),
                ..Default::default()
            })
        }
    }

    async fn spawn() -> String {
        let agent = AgentLoop::new(
            AgentConfig::default(),
            Arc::new(Fixed("Paris")),
            ToolRegistry::new(),
        );
        let state = Arc::new(AppState {
            agent,
            shutdown: CancellationToken::new(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn ask_returns_answer() {
        let base = spawn().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ask", base))
            .json(&json!({"query": "capital of France", "model": "other/model"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["answer"], "Paris (other/model)");
        assert_eq!(body["stop_reason"], "answered");
        assert_eq!(body["steps"], 1);
        assert_eq!(body["trace"][0]["entry_type"], "response");
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let base = spawn().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ask", base))
            .json(&json!({"query": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn health_reports_the_model_runs_use() {
        let base = spawn().await;
        let body: Value = reqwest::get(format!("{}/api/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["model"], "openai/gpt-4o-mini");

        let run: Value = reqwest::Client::new()
            .post(format!("{}/api/ask", base))
            .json(&json!({"query": "capital of France"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(run["answer"], format!("Paris ({})", body["model"].as_str().unwrap()));
    }
}
