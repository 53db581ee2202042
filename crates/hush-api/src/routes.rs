//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression and all
//! endpoint handlers.

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use hush_core::error::HushError;

use crate::handlers;
use crate::state::AppState;

/// Upper bound on request bodies (context uploads, audio).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/question", post(handlers::question))
        .route("/voice", post(handlers::voice))
        .route(
            "/context",
            get(handlers::context_summary)
                .post(handlers::add_context)
                .delete(handlers::clear_context),
        )
        .route("/context/upload", post(handlers::upload_context))
        .route("/context/search", post(handlers::search_context))
        .route(
            "/history",
            get(handlers::history).delete(handlers::clear_history),
        )
        .route(
            "/sessions/{client_id}",
            post(handlers::connect_session).delete(handlers::disconnect_session),
        )
        .route("/sessions/{client_id}/events", post(handlers::session_event))
        .route("/sessions/{client_id}/stream", get(handlers::session_stream))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address and serve until
/// `shutdown` resolves. Open sessions are torn down before returning.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), HushError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let sessions = state.sessions.clone();
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HushError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HushError::Api(format!("Server error: {}", e)))?;

    sessions.shutdown();
    tracing::info!("API server stopped");
    Ok(())
}
