//! Route handler functions for all API endpoints.
//!
//! Each handler extracts its input via axum extractors, calls into the
//! session manager or orchestrator, and returns JSON.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use hush_assist::{AssistError, SessionManager, VoiceOutcome, PASSIVE_LISTENING};
use hush_core::events::{AssistantEvent, InboundEvent, DEFAULT_CONTEXT_SOURCE};
use hush_core::types::{
    ContextEntry, ContextSummary, ConversationExchange, ResponseEvent, SystemStatus,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Default source tag for raw file uploads without a filename.
const DEFAULT_UPLOAD_NAME: &str = "upload.txt";

// =============================================================================
// Shared response types
// =============================================================================

/// Generic acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Health and status
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// GET /health - liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        mode: PASSIVE_LISTENING.to_string(),
        timestamp: Utc::now(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /status - listening state and store sizes.
pub async fn status(State(state): State<AppState>) -> Result<Json<SystemStatus>, ApiError> {
    Ok(Json(state.sessions.status()?))
}

// =============================================================================
// Direct questions
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

/// POST /question - answer a typed question without touching history.
pub async fn question(
    State(state): State<AppState>,
    Json(body): Json<QuestionRequest>,
) -> Result<Json<ResponseEvent>, ApiError> {
    if body.question.trim().is_empty() {
        return Err(ApiError::BadRequest("'question' must not be empty".to_string()));
    }
    let event = state.orchestrator().answer_question(&body.question).await?;
    Ok(Json(event))
}

/// POST /voice - transcribe a recording and answer it if it is a question.
pub async fn voice(
    State(state): State<AppState>,
    audio: Bytes,
) -> Result<Json<VoiceOutcome>, ApiError> {
    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio body must not be empty".to_string()));
    }
    let outcome = state.orchestrator().process_voice(&audio).await?;
    Ok(Json(outcome))
}

// =============================================================================
// Context
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub content: String,
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextUploadResponse {
    pub status: String,
    pub source: String,
    /// Uploaded size in characters, before the per-entry cap.
    pub size: usize,
    pub summary: ContextSummary,
}

/// POST /context - add reference material from a JSON body.
pub async fn add_context(
    State(state): State<AppState>,
    Json(body): Json<ContextRequest>,
) -> Result<Json<ContextUploadResponse>, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("'content' must not be empty".to_string()));
    }
    let source = body
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONTEXT_SOURCE.to_string());

    let summary = state
        .orchestrator()
        .add_context(&body.content, &source, body.metadata)?;

    Ok(Json(ContextUploadResponse {
        status: "success".to_string(),
        size: body.content.chars().count(),
        source,
        summary,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

/// POST /context/upload?filename= - add a raw UTF-8 text file.
pub async fn upload_context(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<ContextUploadResponse>, ApiError> {
    let content = String::from_utf8(body.to_vec())
        .map_err(|e| ApiError::BadRequest(format!("upload is not valid UTF-8: {}", e)))?;
    let source = params
        .filename
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
    let size = content.chars().count();

    let summary = state.orchestrator().add_context(
        &content,
        &source,
        serde_json::json!({ "size": size }),
    )?;

    Ok(Json(ContextUploadResponse {
        status: "success".to_string(),
        source,
        size,
        summary,
    }))
}

/// GET /context - summary of stored context.
pub async fn context_summary(
    State(state): State<AppState>,
) -> Result<Json<ContextSummary>, ApiError> {
    Ok(Json(state.orchestrator().context_summary()?))
}

/// DELETE /context - drop all stored context.
pub async fn clear_context(State(state): State<AppState>) -> Result<Json<StatusMessage>, ApiError> {
    state.orchestrator().clear_context()?;
    Ok(Json(StatusMessage::success("All contexts cleared")))
}

#[derive(Debug, Deserialize)]
pub struct ContextSearchRequest {
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextSearchResponse {
    pub entries: Vec<ContextEntry>,
}

/// POST /context/search - entries containing any keyword.
pub async fn search_context(
    State(state): State<AppState>,
    Json(body): Json<ContextSearchRequest>,
) -> Result<Json<ContextSearchResponse>, ApiError> {
    let entries = state.orchestrator().search_context(&body.keywords)?;
    Ok(Json(ContextSearchResponse { entries }))
}

// =============================================================================
// History
// =============================================================================

/// GET /history - retained exchanges, oldest first.
pub async fn history(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationExchange>>, ApiError> {
    Ok(Json(state.orchestrator().history()?))
}

/// DELETE /history - forget all exchanges.
pub async fn clear_history(State(state): State<AppState>) -> Result<Json<StatusMessage>, ApiError> {
    state.orchestrator().clear_history()?;
    Ok(Json(StatusMessage::success("History cleared")))
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub client_id: String,
    pub status: String,
}

/// POST /sessions/{client_id} - open a session.
pub async fn connect_session(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    state.sessions.connect(&client_id)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            client_id,
            status: PASSIVE_LISTENING.to_string(),
        }),
    ))
}

/// POST /sessions/{client_id}/events - queue an inbound event.
pub async fn session_event(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(event): Json<InboundEvent>,
) -> Result<StatusCode, ApiError> {
    state.sessions.send(&client_id, event).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Closes a session opened by an SSE stream once that stream is dropped.
struct StreamSession {
    sessions: Arc<SessionManager>,
    client_id: String,
    connection_id: u64,
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        match self
            .sessions
            .disconnect_connection(&self.client_id, self.connection_id)
        {
            Ok(true) => tracing::info!(client_id = %self.client_id, "SSE listener gone, session closed"),
            Ok(false) => {}
            Err(e) => tracing::warn!(client_id = %self.client_id, error = %e, "Failed to close session"),
        }
    }
}

/// GET /sessions/{client_id}/stream - SSE of the session's outbound events.
///
/// Opens the session when it does not exist yet, so a listener that connects
/// here first also receives the initial status event. A session opened here
/// is closed when the stream ends; attaching to an existing session leaves
/// its lifetime alone.
pub async fn session_stream(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    let (rx, owner) = match state.sessions.connect(&client_id) {
        Ok(rx) => {
            let owner = StreamSession {
                sessions: Arc::clone(&state.sessions),
                client_id: client_id.clone(),
                connection_id: state.sessions.connection_id(&client_id)?,
            };
            (rx, Some(owner))
        }
        Err(AssistError::SessionExists(_)) => (state.sessions.subscribe(&client_id)?, None),
        Err(e) => return Err(e.into()),
    };

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _owner = &owner;
        sse_event(&client_id, result)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// One SSE frame per event; lagged listeners skip ahead with a warning.
fn sse_event(
    client_id: &str,
    result: Result<AssistantEvent, BroadcastStreamRecvError>,
) -> Option<Result<Event, Infallible>> {
    match result {
        Ok(event) => {
            let data = match serde_json::to_string(&event) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(client_id = %client_id, error = %e, "Failed to encode event");
                    return None;
                }
            };
            Some(Ok(Event::default().event(event.event_name()).data(data)))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(client_id = %client_id, skipped, "SSE listener lagged, events dropped");
            None
        }
    }
}

/// DELETE /sessions/{client_id} - tear down a session.
pub async fn disconnect_session(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    state.sessions.disconnect(&client_id)?;
    Ok(Json(StatusMessage::success(format!("Session {} closed", client_id))))
}
