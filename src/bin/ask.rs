//! One-shot research from the command line.
//!
//! `web-agent-ask <question...>` prints only the final answer; tool traffic
//! goes to the log (`RUST_LOG=web_agent=debug`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use web_agent::{agent::AgentLoop, config::Config};

const EXAMPLE_QUESTION: &str = "What are some use cases of OpenAI's Deep Research?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "web_agent=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let question = if args.is_empty() {
        EXAMPLE_QUESTION.to_string()
    } else {
        args.join(" ")
    };

    let config = Config::from_env()?;
    let agent = AgentLoop::from_config(&config)?;
    tracing::debug!(model = %agent.config().model, "Researching: {}", question);

    let run = agent.run(&question).await?;
    tracing::debug!(
        steps = run.steps,
        tool_calls = run.tool_calls,
        stop_reason = ?run.stop_reason,
        "Run finished"
    );

    println!("{}", run.answer);
    Ok(())
}
