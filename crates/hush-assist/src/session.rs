//! Per-client sessions.
//!
//! Each connected client gets an ordered inbound queue drained by its own
//! worker task, so fragments of one session are processed strictly in
//! arrival order while separate sessions run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use hush_core::events::{AssistantEvent, InboundEvent};
use hush_core::types::SystemStatus;

use crate::error::AssistError;
use crate::orchestrator::{EventSink, ResponseOrchestrator};

/// Outbound events buffered per session before slow listeners lag.
const OUTBOUND_CAPACITY: usize = 256;

/// Inbound events queued per session before senders wait.
const INBOUND_CAPACITY: usize = 64;

/// Status reported to a client when its session opens.
pub const PASSIVE_LISTENING: &str = "passive_listening";

struct SessionHandle {
    connection_id: u64,
    inbound: mpsc::Sender<InboundEvent>,
    sink: EventSink,
    worker: JoinHandle<()>,
    connected_at: DateTime<Utc>,
}

/// Registry of live client sessions sharing one orchestrator.
pub struct SessionManager {
    orchestrator: Arc<ResponseOrchestrator>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    next_connection: AtomicU64,
}

impl SessionManager {
    pub fn new(orchestrator: Arc<ResponseOrchestrator>) -> Self {
        Self {
            orchestrator,
            sessions: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn orchestrator(&self) -> &Arc<ResponseOrchestrator> {
        &self.orchestrator
    }

    /// Open a session and start its worker.
    ///
    /// The returned receiver is subscribed before the initial
    /// `passive_listening` status event is emitted, so it always sees it.
    pub fn connect(
        &self,
        client_id: &str,
    ) -> Result<broadcast::Receiver<AssistantEvent>, AssistError> {
        let mut sessions = self.lock_sessions()?;
        if sessions.contains_key(client_id) {
            return Err(AssistError::SessionExists(client_id.to_string()));
        }

        let sink = EventSink::new(OUTBOUND_CAPACITY);
        let receiver = sink.subscribe();
        let (inbound, rx) = mpsc::channel(INBOUND_CAPACITY);
        let worker = tokio::spawn(run_worker(
            Arc::clone(&self.orchestrator),
            client_id.to_string(),
            rx,
            sink.clone(),
        ));

        sink.emit(AssistantEvent::Status {
            status: PASSIVE_LISTENING.to_string(),
            message: "Listening for questions...".to_string(),
        });

        sessions.insert(
            client_id.to_string(),
            SessionHandle {
                connection_id: self.next_connection.fetch_add(1, Ordering::Relaxed),
                inbound,
                sink,
                worker,
                connected_at: Utc::now(),
            },
        );
        tracing::info!(client_id = %client_id, active = sessions.len(), "Client connected");
        Ok(receiver)
    }

    /// Queue an inbound event for the session's worker.
    pub async fn send(&self, client_id: &str, event: InboundEvent) -> Result<(), AssistError> {
        let inbound = {
            let sessions = self.lock_sessions()?;
            sessions
                .get(client_id)
                .map(|s| s.inbound.clone())
                .ok_or_else(|| AssistError::SessionNotFound(client_id.to_string()))?
        };
        inbound
            .send(event)
            .await
            .map_err(|_| AssistError::SessionClosed(client_id.to_string()))
    }

    /// Additional listener on an open session's outbound events.
    pub fn subscribe(
        &self,
        client_id: &str,
    ) -> Result<broadcast::Receiver<AssistantEvent>, AssistError> {
        self.lock_sessions()?
            .get(client_id)
            .map(|s| s.sink.subscribe())
            .ok_or_else(|| AssistError::SessionNotFound(client_id.to_string()))
    }

    /// Tear down a session.
    ///
    /// Queued events are discarded and no new generation call is issued; a
    /// call already in flight runs to completion or timeout.
    pub fn disconnect(&self, client_id: &str) -> Result<(), AssistError> {
        let handle = self
            .lock_sessions()?
            .remove(client_id)
            .ok_or_else(|| AssistError::SessionNotFound(client_id.to_string()))?;
        close_session(client_id, handle);
        Ok(())
    }

    /// Identifier of the live connection for `client_id`.
    ///
    /// A client id reused after a disconnect gets a new identifier.
    pub fn connection_id(&self, client_id: &str) -> Result<u64, AssistError> {
        self.lock_sessions()?
            .get(client_id)
            .map(|s| s.connection_id)
            .ok_or_else(|| AssistError::SessionNotFound(client_id.to_string()))
    }

    /// Tear down `client_id` only if it is still the given connection.
    ///
    /// Returns whether a session was closed.
    pub fn disconnect_connection(
        &self,
        client_id: &str,
        connection_id: u64,
    ) -> Result<bool, AssistError> {
        let handle = {
            let mut sessions = self.lock_sessions()?;
            let current = sessions
                .get(client_id)
                .is_some_and(|s| s.connection_id == connection_id);
            if current {
                sessions.remove(client_id)
            } else {
                None
            }
        };
        Ok(match handle {
            Some(handle) => {
                close_session(client_id, handle);
                true
            }
            None => false,
        })
    }

    /// Disconnect every session.
    pub fn shutdown(&self) {
        let ids: Vec<String> = match self.lock_sessions() {
            Ok(sessions) => sessions.keys().cloned().collect(),
            Err(e) => {
                tracing::error!(error = %e, "Cannot shut down sessions");
                return;
            }
        };
        for id in ids {
            if let Err(e) = self.disconnect(&id) {
                tracing::debug!(client_id = %id, error = %e, "Session already gone");
            }
        }
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.lock_sessions()
            .map(|s| s.contains_key(client_id))
            .unwrap_or(false)
    }

    pub fn active_sessions(&self) -> usize {
        self.lock_sessions().map(|s| s.len()).unwrap_or(0)
    }

    pub fn status(&self) -> Result<SystemStatus, AssistError> {
        self.orchestrator.status(self.active_sessions())
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<String, SessionHandle>>, AssistError> {
        self.sessions
            .lock()
            .map_err(|_| AssistError::LockPoisoned("session registry".to_string()))
    }
}

fn close_session(client_id: &str, handle: SessionHandle) {
    handle.sink.close();

    let duration = Utc::now() - handle.connected_at;
    tracing::info!(
        client_id = %client_id,
        connection_id = handle.connection_id,
        connected_secs = duration.num_seconds(),
        worker_finished = handle.worker.is_finished(),
        "Client disconnected"
    );
}

async fn run_worker(
    orchestrator: Arc<ResponseOrchestrator>,
    client_id: String,
    mut inbound: mpsc::Receiver<InboundEvent>,
    sink: EventSink,
) {
    while let Some(event) = inbound.recv().await {
        if !sink.is_open() {
            break;
        }
        if let Err(e) = orchestrator.handle_inbound(event, &sink).await {
            tracing::warn!(client_id = %client_id, error = %e, "Failed to handle inbound event");
        }
    }
    tracing::debug!(client_id = %client_id, "Session worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use hush_core::HushConfig;

    use crate::error::GenerationError;
    use crate::generator::{GenerationRequest, Generator};

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            let question = request
                .user_prompt
                .rsplit("Question: ")
                .next()
                .unwrap_or_default();
            Ok(format!("echo {}", question))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Echoes the question after a fixed delay.
    struct SlowGenerator(Duration);

    #[async_trait]
    impl Generator for SlowGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            tokio::time::sleep(self.0).await;
            EchoGenerator.generate(request).await
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn manager() -> SessionManager {
        let orchestrator = ResponseOrchestrator::new(&HushConfig::default(), Arc::new(EchoGenerator));
        SessionManager::new(Arc::new(orchestrator))
    }

    fn final_text(text: &str) -> InboundEvent {
        InboundEvent::Transcription {
            text: Some(text.to_string()),
            is_final: true,
            confidence: None,
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<AssistantEvent>) -> AssistantEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    async fn next_answer(rx: &mut broadcast::Receiver<AssistantEvent>) -> String {
        loop {
            if let AssistantEvent::AiResponse { answer, .. } = next_event(rx).await {
                return answer;
            }
        }
    }

    // ---- lifecycle ----

    #[tokio::test]
    async fn test_connect_emits_passive_listening() {
        let manager = manager();
        let mut rx = manager.connect("c1").unwrap();

        match next_event(&mut rx).await {
            AssistantEvent::Status { status, .. } => assert_eq!(status, PASSIVE_LISTENING),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(manager.is_connected("c1"));
        assert_eq!(manager.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_connect_rejected() {
        let manager = manager();
        let _rx = manager.connect("c1").unwrap();
        assert!(matches!(
            manager.connect("c1"),
            Err(AssistError::SessionExists(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let manager = manager();
        assert!(matches!(
            manager.send("ghost", InboundEvent::ClearHistory).await,
            Err(AssistError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.subscribe("ghost"),
            Err(AssistError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.disconnect("ghost"),
            Err(AssistError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let manager = manager();
        let _rx = manager.connect("c1").unwrap();
        manager.disconnect("c1").unwrap();
        assert!(!manager.is_connected("c1"));
        assert_eq!(manager.active_sessions(), 0);
        assert!(manager.send("c1", InboundEvent::ClearHistory).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_ids_differ_on_reconnect() {
        let manager = manager();
        let _rx = manager.connect("c1").unwrap();
        let first = manager.connection_id("c1").unwrap();
        manager.disconnect("c1").unwrap();

        let _rx = manager.connect("c1").unwrap();
        assert_ne!(manager.connection_id("c1").unwrap(), first);
    }

    #[tokio::test]
    async fn test_disconnect_connection_ignores_stale_id() {
        let manager = manager();
        let _rx = manager.connect("c1").unwrap();
        let stale = manager.connection_id("c1").unwrap();
        manager.disconnect("c1").unwrap();
        let _rx = manager.connect("c1").unwrap();

        assert!(!manager.disconnect_connection("c1", stale).unwrap());
        assert!(manager.is_connected("c1"));

        let current = manager.connection_id("c1").unwrap();
        assert!(manager.disconnect_connection("c1", current).unwrap());
        assert!(!manager.is_connected("c1"));
    }

    #[tokio::test]
    async fn test_in_flight_answer_completes_after_disconnect() {
        let orchestrator = ResponseOrchestrator::new(
            &HushConfig::default(),
            Arc::new(SlowGenerator(Duration::from_millis(300))),
        );
        let manager = SessionManager::new(Arc::new(orchestrator));
        let mut rx = manager.connect("c1").unwrap();

        manager.send("c1", final_text("what is the status of the build")).await.unwrap();
        loop {
            if let AssistantEvent::Processing { .. } = next_event(&mut rx).await {
                break;
            }
        }
        manager.disconnect("c1").unwrap();
        assert!(!manager.is_connected("c1"));

        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.orchestrator().history().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("in-flight answer was not recorded");

        let history = manager.orchestrator().history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].answer, "echo what is the status of the build");
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_all() {
        let manager = manager();
        let _a = manager.connect("a").unwrap();
        let _b = manager.connect("b").unwrap();
        manager.shutdown();
        assert_eq!(manager.active_sessions(), 0);
    }

    // ---- ordering ----

    #[tokio::test]
    async fn test_fragments_answered_in_arrival_order() {
        let manager = manager();
        let mut rx = manager.connect("c1").unwrap();

        manager.send("c1", final_text("what is the first item")).await.unwrap();
        manager.send("c1", final_text("what is the second item")).await.unwrap();
        manager.send("c1", final_text("what is the third item")).await.unwrap();

        assert_eq!(next_answer(&mut rx).await, "echo what is the first item");
        assert_eq!(next_answer(&mut rx).await, "echo what is the second item");
        assert_eq!(next_answer(&mut rx).await, "echo what is the third item");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = manager();
        let mut a = manager.connect("a").unwrap();
        let mut b = manager.connect("b").unwrap();
        // Skip the initial status events.
        next_event(&mut a).await;
        next_event(&mut b).await;

        manager.send("a", final_text("who is speaking next")).await.unwrap();
        assert_eq!(next_answer(&mut a).await, "echo who is speaking next");
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_receives_later_events() {
        let manager = manager();
        let _rx = manager.connect("c1").unwrap();
        let mut late = manager.subscribe("c1").unwrap();

        manager.send("c1", InboundEvent::ClearHistory).await.unwrap();
        assert!(matches!(
            next_event(&mut late).await,
            AssistantEvent::HistoryCleared { .. }
        ));
    }

    #[tokio::test]
    async fn test_status_counts_sessions() {
        let manager = manager();
        let _rx = manager.connect("c1").unwrap();
        let status = manager.status().unwrap();
        assert_eq!(status.active_sessions, 1);
        assert!(status.is_listening);
    }
}
