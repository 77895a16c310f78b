//! HTTP API for the web agent.
//!
//! ## Endpoints
//!
//! - `POST /api/ask` - Research a question and return the answer with its trace
//! - `GET /api/health` - Health check

mod routes;
pub mod types;

pub use routes::{app, serve, AppState};
