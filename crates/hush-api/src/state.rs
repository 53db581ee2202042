//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use hush_assist::{ResponseOrchestrator, SessionManager};
use hush_core::HushConfig;

/// Shared application state.
///
/// Cloned into every handler; all fields are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HushConfig>,
    /// Live client sessions; also owns the shared orchestrator.
    pub sessions: Arc<SessionManager>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: HushConfig, orchestrator: ResponseOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionManager::new(Arc::new(orchestrator))),
            start_time: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> &ResponseOrchestrator {
        self.sessions.orchestrator()
    }
}
