//! Hush API crate - axum HTTP transport, route handlers, SSE streaming.
//!
//! Carries inbound session events to the orchestrator, streams outbound
//! assistant events back over server-sent events, and exposes REST endpoints
//! for context, history, direct questions, status and health.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
