//! Response orchestrator: the per-fragment decision pipeline.
//!
//! Runs noise filter -> classifier -> respond gate -> context and history
//! retrieval -> generation -> history update, emitting structured events to
//! the session's listeners along the way. Nothing in here is fatal to the
//! pipeline: generation failures become the fallback answer and rejected
//! input is a normal outcome.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use hush_context::{ContextStore, ConversationHistory};
use hush_core::config::{DetectionConfig, GenerationConfig, ResponseConfig};
use hush_core::events::{AssistantEvent, InboundEvent};
use hush_core::types::{
    ClassificationResult, ContextEntry, ContextSummary, ConversationExchange, ListeningStatus,
    ResponseEvent, SystemStatus, TextFragment,
};
use hush_core::HushConfig;
use hush_detect::{NoiseFilter, QuestionClassifier};

use crate::error::{AssistError, GenerationError};
use crate::generator::{build_request, Generator};
use crate::postprocess::enforce_word_limit;
use crate::state::{Pipeline, PipelineState};
use crate::transcriber::{Transcriber, Transcript};

/// Recognition confidence assumed for text transcribed on the client.
pub const CLIENT_TRANSCRIPTION_CONFIDENCE: f64 = 0.85;

/// Answer returned by the direct entry point for non-questions.
pub const NOT_A_QUESTION: &str = "Not a question";

const PROCESSING_MESSAGE: &str = "Generating response...";

// =============================================================================
// EventSink
// =============================================================================

/// Outbound channel of one session plus its open/closed flag.
///
/// Closing the sink stops new generation calls for the session; a call
/// already in flight still completes.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: broadcast::Sender<AssistantEvent>,
    open: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Broadcast `event` to every current listener. Having none is fine.
    pub fn emit(&self, event: AssistantEvent) {
        let name = event.event_name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "No listeners for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.tx.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// How a fragment left the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Dropped by the noise filter; no events emitted.
    Noise,
    /// Classified but did not pass the respond gate.
    Rejected(ClassificationResult),
    /// Answered and recorded in history.
    Answered(ResponseEvent),
    /// Generation failed; the fallback answer was delivered and nothing was
    /// recorded.
    Fallback(ResponseEvent),
    /// Passed the gate after the session was torn down; no generation call
    /// was made.
    Closed(ClassificationResult),
}

/// Result of transcribing and answering an uploaded recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VoiceOutcome {
    NoSpeech,
    Noise {
        transcription: String,
    },
    Statement {
        transcription: String,
        confidence: f64,
    },
    QuestionDetected {
        transcription: String,
        extracted_question: String,
        answer: String,
        processing_time: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Decrements a counter on drop so cancelled futures still release it.
struct ActivityGuard<'a>(&'a AtomicUsize);

impl<'a> ActivityGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// ResponseOrchestrator
// =============================================================================

/// Sequences detection, retrieval and generation for every session.
///
/// The context store and history are shared by all sessions and guarded by
/// read/write locks; no lock is held across the generation call.
pub struct ResponseOrchestrator {
    noise: NoiseFilter,
    classifier: QuestionClassifier,
    context: RwLock<ContextStore>,
    history: RwLock<ConversationHistory>,
    generator: Arc<dyn Generator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    detection: DetectionConfig,
    response: ResponseConfig,
    generation: GenerationConfig,
    classifying: AtomicUsize,
    responding: AtomicUsize,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

impl ResponseOrchestrator {
    pub fn new(config: &HushConfig, generator: Arc<dyn Generator>) -> Self {
        Self {
            noise: NoiseFilter::new(),
            classifier: QuestionClassifier::new(),
            context: RwLock::new(ContextStore::new(config.context.max_entry_chars)),
            history: RwLock::new(ConversationHistory::new(config.history.max_exchanges)),
            generator,
            transcriber: None,
            detection: config.detection.clone(),
            response: config.response.clone(),
            generation: config.generation.clone(),
            classifying: AtomicUsize::new(0),
            responding: AtomicUsize::new(0),
            last_activity: Mutex::new(None),
        }
    }

    /// Attach a speech-to-text collaborator for raw audio input.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn has_transcriber(&self) -> bool {
        self.transcriber.is_some()
    }

    // ---- pipeline ----

    /// Run one fragment through the pipeline, emitting events to `sink`.
    ///
    /// Only lock poisoning is reported as an error; every other outcome,
    /// including generation failure, is a [`PipelineOutcome`].
    pub async fn process_fragment(
        &self,
        fragment: &TextFragment,
        sink: &EventSink,
    ) -> Result<PipelineOutcome, AssistError> {
        let mut pipeline = Pipeline::start();
        pipeline.advance(PipelineState::Classifying);
        let classifying = ActivityGuard::enter(&self.classifying);
        self.touch();

        let text = fragment.text.as_str();
        if self.noise.is_noise(text) {
            tracing::debug!(text = %text, "Filtered noise");
            pipeline.advance(PipelineState::Idle);
            return Ok(PipelineOutcome::Noise);
        }

        let classification = self.classifier.classify(text);
        sink.emit(AssistantEvent::QuestionDetection {
            text: text.to_string(),
            is_question: classification.is_question,
            confidence: classification.confidence,
            question_type: classification.question_type,
        });

        if !self.passes_gate(fragment, &classification) {
            pipeline.advance(PipelineState::Rejected);
            tracing::debug!(
                text = %text,
                confidence = classification.confidence,
                question_type = %classification.question_type,
                "No response needed"
            );
            pipeline.advance(PipelineState::Idle);
            return Ok(PipelineOutcome::Rejected(classification));
        }

        if !sink.is_open() {
            tracing::info!(text = %text, "Session closed, skipping generation");
            pipeline.advance(PipelineState::Idle);
            return Ok(PipelineOutcome::Closed(classification));
        }

        pipeline.advance(PipelineState::Responding);
        drop(classifying);
        let _responding = ActivityGuard::enter(&self.responding);

        tracing::info!(
            confidence = classification.confidence,
            question_type = %classification.question_type,
            text = %text,
            "Question detected"
        );
        sink.emit(AssistantEvent::Processing {
            message: PROCESSING_MESSAGE.to_string(),
        });

        let question = self.classifier.extract_question(text);
        let context = self.follow_up_context()?;

        let (answer, recorded) = match self.generate_answer(question, &context).await {
            Ok(answer) => {
                self.history_write()?.append(question, answer.as_str());
                (answer, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, question = %question, "Generation failed, using fallback");
                (self.response.fallback_answer.clone(), false)
            }
        };

        let event = ResponseEvent {
            question: question.to_string(),
            answer,
            confidence: classification.confidence,
            created_at: Utc::now(),
            processing_duration_secs: elapsed_since(fragment.received_at),
        };

        sink.emit(AssistantEvent::AiResponse {
            question: event.question.clone(),
            answer: event.answer.clone(),
            confidence: event.confidence,
            timestamp: event.created_at,
            processing_time: event.processing_duration_secs,
            should_speak: true,
        });
        tracing::info!(answer = %event.answer, "Responded");

        pipeline.advance(PipelineState::Idle);
        self.touch();

        Ok(if recorded {
            PipelineOutcome::Answered(event)
        } else {
            PipelineOutcome::Fallback(event)
        })
    }

    /// Respond gate: a question, confident enough, and long enough.
    fn passes_gate(&self, fragment: &TextFragment, classification: &ClassificationResult) -> bool {
        classification.is_question
            && classification.confidence >= self.detection.confidence_threshold
            && fragment.token_count() >= self.detection.min_question_length
    }

    /// Uploaded context and recent exchanges, as fed to follow-up answers.
    fn follow_up_context(&self) -> Result<String, AssistError> {
        let user_context = self.context_read()?.relevant(self.response.context_window_chars);
        let history_block = self.history_read()?.render_recent(self.response.history_window);
        Ok(format!("{}\n\n{}", user_context, history_block))
    }

    /// One bounded generation call followed by answer post-processing.
    async fn generate_answer(&self, question: &str, context: &str) -> Result<String, GenerationError> {
        let max_words = self.response.max_response_words;
        let request = build_request(question, context, max_words, &self.generation);
        let timeout_secs = self.response.response_timeout_secs;

        let started = Instant::now();
        let raw = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.generator.generate(&request),
        )
        .await
        .map_err(|_| GenerationError::Timeout(timeout_secs))??;

        let answer = enforce_word_limit(&raw, max_words);
        if answer.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        tracing::info!(
            backend = self.generator.name(),
            latency_ms = started.elapsed().as_millis() as u64,
            words = answer.split_whitespace().count(),
            "Answer generated"
        );
        Ok(answer)
    }

    // ---- direct entry points ----

    /// Answer a typed question without the noise filter or history.
    ///
    /// Non-questions get [`NOT_A_QUESTION`] without a generation call.
    /// Generation failures yield the fallback answer. Nothing is recorded.
    pub async fn answer_question(&self, question: &str) -> Result<ResponseEvent, AssistError> {
        let started = Instant::now();
        self.touch();
        let classification = self.classifier.classify(question);

        if !classification.is_question {
            return Ok(ResponseEvent {
                question: question.to_string(),
                answer: NOT_A_QUESTION.to_string(),
                confidence: classification.confidence,
                created_at: Utc::now(),
                processing_duration_secs: 0.0,
            });
        }

        let _responding = ActivityGuard::enter(&self.responding);
        let context = self.context_read()?.relevant(self.response.context_window_chars);
        let answer = self.answer_or_fallback(question, &context).await;

        Ok(ResponseEvent {
            question: question.to_string(),
            answer,
            confidence: classification.confidence,
            created_at: Utc::now(),
            processing_duration_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Transcribe a recording, then classify and answer it.
    ///
    /// Statements and noise are reported, not answered. Nothing is recorded.
    pub async fn process_voice(&self, audio: &[u8]) -> Result<VoiceOutcome, AssistError> {
        let started = Instant::now();
        let Some(transcript) = self.transcribe(audio).await? else {
            return Ok(VoiceOutcome::NoSpeech);
        };
        self.touch();
        let text = transcript.text;

        if self.noise.is_noise(&text) {
            return Ok(VoiceOutcome::Noise { transcription: text });
        }

        let classification = self.classifier.classify(&text);
        if !classification.is_question {
            return Ok(VoiceOutcome::Statement {
                confidence: classification.confidence,
                transcription: text,
            });
        }

        let _responding = ActivityGuard::enter(&self.responding);
        let question = self.classifier.extract_question(&text).to_string();
        let context = self.context_read()?.relevant(self.response.context_window_chars);
        let answer = self.answer_or_fallback(&question, &context).await;

        Ok(VoiceOutcome::QuestionDetected {
            transcription: text,
            extracted_question: question,
            answer,
            processing_time: started.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
        })
    }

    async fn answer_or_fallback(&self, question: &str, context: &str) -> String {
        match self.generate_answer(question, context).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, question = %question, "Generation failed, using fallback");
                self.response.fallback_answer.clone()
            }
        }
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcript>, AssistError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or(AssistError::TranscriberUnavailable)?;
        let transcript = transcriber.transcribe(audio).await?;
        Ok(transcript.filter(|t| !t.text.trim().is_empty()))
    }

    // ---- inbound events ----

    /// Apply one inbound session event.
    pub async fn handle_inbound(
        &self,
        event: InboundEvent,
        sink: &EventSink,
    ) -> Result<(), AssistError> {
        match event {
            InboundEvent::AudioChunk { audio } => {
                if !self.has_transcriber() {
                    tracing::debug!(bytes = audio.len(), "No transcriber, dropping audio chunk");
                    return Ok(());
                }
                let Some(transcript) = self.transcribe(&audio).await? else {
                    return Ok(());
                };
                sink.emit(AssistantEvent::Transcription {
                    text: transcript.text.clone(),
                    confidence: transcript.confidence,
                    timestamp: Utc::now(),
                });
                let fragment = TextFragment::new(transcript.text, transcript.confidence);
                self.process_fragment(&fragment, sink).await?;
            }
            InboundEvent::Transcription {
                text,
                is_final,
                confidence,
            } => {
                if !is_final {
                    tracing::trace!("Ignoring interim transcription");
                    return Ok(());
                }
                let fragment = TextFragment::new(
                    text.unwrap_or_default(),
                    confidence.unwrap_or(CLIENT_TRANSCRIPTION_CONFIDENCE),
                );
                self.process_fragment(&fragment, sink).await?;
            }
            InboundEvent::Context {
                content,
                source,
                metadata,
            } => {
                let summary = self.add_context(&content, &source, metadata)?;
                sink.emit(AssistantEvent::ContextUpdated {
                    message: "Context added".to_string(),
                    summary,
                });
            }
            InboundEvent::ClearHistory => {
                self.clear_history()?;
                sink.emit(AssistantEvent::HistoryCleared {
                    message: "History cleared".to_string(),
                });
            }
            InboundEvent::ClearContext => {
                let summary = self.clear_context()?;
                sink.emit(AssistantEvent::ContextUpdated {
                    message: "Context cleared".to_string(),
                    summary,
                });
            }
        }
        Ok(())
    }

    // ---- stores ----

    /// Append reference material and return the updated summary.
    pub fn add_context(
        &self,
        content: &str,
        source: &str,
        metadata: serde_json::Value,
    ) -> Result<ContextSummary, AssistError> {
        let mut store = self.context_write()?;
        store.add(content, source, metadata);
        Ok(store.summary())
    }

    pub fn context_summary(&self) -> Result<ContextSummary, AssistError> {
        Ok(self.context_read()?.summary())
    }

    pub fn search_context<S: AsRef<str>>(
        &self,
        keywords: &[S],
    ) -> Result<Vec<ContextEntry>, AssistError> {
        Ok(self
            .context_read()?
            .search(keywords)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn clear_context(&self) -> Result<ContextSummary, AssistError> {
        let mut store = self.context_write()?;
        store.clear();
        Ok(store.summary())
    }

    pub fn history(&self) -> Result<Vec<ConversationExchange>, AssistError> {
        Ok(self.history_read()?.all())
    }

    pub fn clear_history(&self) -> Result<(), AssistError> {
        self.history_write()?.clear();
        Ok(())
    }

    /// Snapshot for status endpoints.
    pub fn status(&self, active_sessions: usize) -> Result<SystemStatus, AssistError> {
        let status = if self.responding.load(Ordering::SeqCst) > 0 {
            ListeningStatus::Responding
        } else if self.classifying.load(Ordering::SeqCst) > 0 {
            ListeningStatus::Processing
        } else if active_sessions > 0 {
            ListeningStatus::Listening
        } else {
            ListeningStatus::Idle
        };

        Ok(SystemStatus {
            status,
            is_listening: active_sessions > 0,
            active_sessions,
            context_entries: self.context_read()?.len(),
            history_exchanges: self.history_read()?.len(),
            last_activity: self.last_activity.lock().ok().and_then(|g| *g),
        })
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Some(Utc::now());
        }
    }

    fn context_read(&self) -> Result<RwLockReadGuard<'_, ContextStore>, AssistError> {
        self.context
            .read()
            .map_err(|_| AssistError::LockPoisoned("context store".to_string()))
    }

    fn context_write(&self) -> Result<RwLockWriteGuard<'_, ContextStore>, AssistError> {
        self.context
            .write()
            .map_err(|_| AssistError::LockPoisoned("context store".to_string()))
    }

    fn history_read(&self) -> Result<RwLockReadGuard<'_, ConversationHistory>, AssistError> {
        self.history
            .read()
            .map_err(|_| AssistError::LockPoisoned("history".to_string()))
    }

    fn history_write(&self) -> Result<RwLockWriteGuard<'_, ConversationHistory>, AssistError> {
        self.history
            .write()
            .map_err(|_| AssistError::LockPoisoned("history".to_string()))
    }
}

fn elapsed_since(start: DateTime<Utc>) -> f64 {
    (Utc::now() - start).num_microseconds().unwrap_or(0).max(0) as f64 / 1_000_000.0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hush_core::types::QuestionType;

    use crate::generator::GenerationRequest;

    /// Generator returning a fixed reply after an optional delay.
    struct ScriptedGenerator {
        reply: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn answering(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn slow(reply: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                delay,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> GenerationRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply
                .clone()
                .ok_or_else(|| GenerationError::Request("backend down".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedTranscriber(Option<&'static str>);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Option<Transcript>, AssistError> {
            Ok(self.0.map(|text| Transcript {
                text: text.to_string(),
                confidence: 0.92,
            }))
        }
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>) -> ResponseOrchestrator {
        ResponseOrchestrator::new(&HushConfig::default(), generator)
    }

    fn drain(rx: &mut broadcast::Receiver<AssistantEvent>) -> Vec<AssistantEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[AssistantEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_name()).collect()
    }

    // ---- noise and gate ----

    #[tokio::test]
    async fn test_noise_is_silent() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        let outcome = orch
            .process_fragment(&TextFragment::new("um", 0.9), &sink)
            .await
            .unwrap();

        assert_eq!(outcome, PipelineOutcome::Noise);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_statement_emits_detection_only() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        let outcome = orch
            .process_fragment(&TextFragment::new("the weather is nice today", 0.9), &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Rejected(c) if !c.is_question));
        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["question_detection"]);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_short_question_rejected_by_length_gate() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);

        // Explicit "?" with only two tokens.
        let outcome = orch
            .process_fragment(&TextFragment::new("really now?", 0.9), &sink)
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Rejected(c) => {
                assert!(c.is_question);
                assert_eq!(c.question_type, QuestionType::ExplicitQ);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_confidence_threshold_gate() {
        let mut config = HushConfig::default();
        config.detection.confidence_threshold = 0.95;
        let generator = ScriptedGenerator::answering("unused");
        let orch = ResponseOrchestrator::new(&config, generator.clone());
        let sink = EventSink::new(16);

        let outcome = orch
            .process_fragment(&TextFragment::new("what is the capital of France", 0.9), &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Rejected(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_text_falls_out_at_length_check() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);

        let outcome = orch
            .process_fragment(&TextFragment::new("", 0.9), &sink)
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Rejected(c) => assert_eq!(c.question_type, QuestionType::None),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    // ---- responding ----

    #[tokio::test]
    async fn test_question_answered_end_to_end() {
        let generator = ScriptedGenerator::answering("Paris.");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        let outcome = orch
            .process_fragment(&TextFragment::new("What is the capital of France", 0.9), &sink)
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["question_detection", "processing", "ai_response"]
        );
        match &events[0] {
            AssistantEvent::QuestionDetection {
                confidence,
                question_type,
                is_question,
                ..
            } => {
                assert!(*is_question);
                assert_eq!(*confidence, 0.90);
                assert_eq!(*question_type, QuestionType::SegmentStartQ);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[2] {
            AssistantEvent::AiResponse {
                question,
                answer,
                should_speak,
                ..
            } => {
                assert_eq!(question, "What is the capital of France");
                assert_eq!(answer, "Paris");
                assert!(*should_speak);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        match outcome {
            PipelineOutcome::Answered(event) => {
                assert_eq!(event.answer, "Paris");
                assert_eq!(event.confidence, 0.90);
                assert!(event.processing_duration_secs >= 0.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let history = orch.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "What is the capital of France");
        assert_eq!(history[0].answer, "Paris");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_long_answer_truncated_to_fifteen_words() {
        let eighteen = "one two three four five six seven eight nine ten eleven twelve \
                        thirteen fourteen fifteen sixteen seventeen eighteen.";
        let generator = ScriptedGenerator::answering(eighteen);
        let orch = orchestrator(generator);
        let sink = EventSink::new(16);

        let outcome = orch
            .process_fragment(&TextFragment::new("how does the engine work", 0.9), &sink)
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Answered(event) => {
                assert_eq!(event.answer.split_whitespace().count(), 15);
                assert!(event.answer.ends_with("fifteen"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generation_failure_uses_fallback_and_records_nothing() {
        let generator = ScriptedGenerator::failing();
        let orch = orchestrator(generator);
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        let outcome = orch
            .process_fragment(&TextFragment::new("where is the meeting today", 0.9), &sink)
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Fallback(event) => assert_eq!(event.answer, "Sorry couldn't get that"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["question_detection", "processing", "ai_response"]
        );
        assert!(orch.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_is_a_failure() {
        let generator = ScriptedGenerator::answering(" ?! ");
        let orch = orchestrator(generator);
        let sink = EventSink::new(16);

        let outcome = orch
            .process_fragment(&TextFragment::new("who is on call tonight", 0.9), &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Fallback(_)));
        assert!(orch.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_timeout_uses_fallback() {
        let mut config = HushConfig::default();
        config.response.response_timeout_secs = 1;
        let generator = ScriptedGenerator::slow("too late", Duration::from_secs(5));
        let orch = ResponseOrchestrator::new(&config, generator.clone());
        let sink = EventSink::new(16);

        let started = Instant::now();
        let outcome = orch
            .process_fragment(&TextFragment::new("when does the train leave", 0.9), &sink)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(matches!(outcome, PipelineOutcome::Fallback(_)));
        assert!(orch.history().unwrap().is_empty());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_context_prefix() {
        let generator = ScriptedGenerator::answering("room four");
        let orch = orchestrator(generator.clone());
        orch.add_context("standup happens in room four", "notes.txt", serde_json::Value::Null)
            .unwrap();
        let sink = EventSink::new(16);

        orch.process_fragment(&TextFragment::new("where is the standup held", 0.9), &sink)
            .await
            .unwrap();

        let request = generator.last_request();
        assert!(request
            .user_prompt
            .starts_with("Context: standup happens in room four\n\n"));
        assert!(request.user_prompt.ends_with("Question: where is the standup held"));
        assert!(request.system_instruction.contains("15 words or less"));
    }

    #[tokio::test]
    async fn test_history_feeds_follow_up_prompt() {
        let generator = ScriptedGenerator::answering("ten am");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);

        orch.process_fragment(&TextFragment::new("when does the demo start", 0.9), &sink)
            .await
            .unwrap();
        orch.process_fragment(&TextFragment::new("who is running the demo", 0.9), &sink)
            .await
            .unwrap();

        let request = generator.last_request();
        assert!(request
            .user_prompt
            .contains("Q: when does the demo start\nA: ten am"));
    }

    #[tokio::test]
    async fn test_closed_sink_skips_generation() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);
        sink.close();

        let outcome = orch
            .process_fragment(&TextFragment::new("what time is it now", 0.9), &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Closed(_)));
        assert_eq!(generator.calls(), 0);
    }

    // ---- direct entry points ----

    #[tokio::test]
    async fn test_answer_question_not_a_question() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());

        let event = orch.answer_question("the sky is blue today").await.unwrap();

        assert_eq!(event.answer, NOT_A_QUESTION);
        assert_eq!(event.processing_duration_secs, 0.0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_question_does_not_record_history() {
        let generator = ScriptedGenerator::answering("Canberra");
        let orch = orchestrator(generator);

        let event = orch
            .answer_question("what is the capital of Australia")
            .await
            .unwrap();

        assert_eq!(event.answer, "Canberra");
        assert!(orch.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_question_fallback() {
        let orch = orchestrator(ScriptedGenerator::failing());
        let event = orch.answer_question("how far is the moon?").await.unwrap();
        assert_eq!(event.answer, "Sorry couldn't get that");
    }

    #[tokio::test]
    async fn test_process_voice_without_transcriber() {
        let orch = orchestrator(ScriptedGenerator::answering("unused"));
        let result = orch.process_voice(b"pcm").await;
        assert!(matches!(result, Err(AssistError::TranscriberUnavailable)));
    }

    #[tokio::test]
    async fn test_process_voice_outcomes() {
        let make = |text| {
            orchestrator(ScriptedGenerator::answering("blue"))
                .with_transcriber(Arc::new(FixedTranscriber(text)))
        };

        assert_eq!(make(None).process_voice(b"x").await.unwrap(), VoiceOutcome::NoSpeech);
        assert!(matches!(
            make(Some("uh huh")).process_voice(b"x").await.unwrap(),
            VoiceOutcome::Noise { .. }
        ));
        assert!(matches!(
            make(Some("the build passed")).process_voice(b"x").await.unwrap(),
            VoiceOutcome::Statement { .. }
        ));
        match make(Some("what colour is the logo")).process_voice(b"x").await.unwrap() {
            VoiceOutcome::QuestionDetected { answer, extracted_question, .. } => {
                assert_eq!(answer, "blue");
                assert_eq!(extracted_question, "what colour is the logo");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    // ---- inbound events ----

    #[tokio::test]
    async fn test_interim_transcription_ignored() {
        let generator = ScriptedGenerator::answering("unused");
        let orch = orchestrator(generator.clone());
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        orch.handle_inbound(
            InboundEvent::Transcription {
                text: Some("what is the capital of France".to_string()),
                is_final: false,
                confidence: None,
            },
            &sink,
        )
        .await
        .unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_final_transcription_processed() {
        let orch = orchestrator(ScriptedGenerator::answering("Paris"));
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        orch.handle_inbound(
            InboundEvent::Transcription {
                text: Some("what is the capital of France".to_string()),
                is_final: true,
                confidence: None,
            },
            &sink,
        )
        .await
        .unwrap();

        assert_eq!(
            names(&drain(&mut rx)),
            vec!["question_detection", "processing", "ai_response"]
        );
    }

    #[tokio::test]
    async fn test_audio_chunk_without_transcriber_dropped() {
        let orch = orchestrator(ScriptedGenerator::answering("unused"));
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        orch.handle_inbound(InboundEvent::AudioChunk { audio: vec![1, 2, 3] }, &sink)
            .await
            .unwrap();

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_audio_chunk_emits_transcription_then_pipeline() {
        let orch = orchestrator(ScriptedGenerator::answering("Paris"))
            .with_transcriber(Arc::new(FixedTranscriber(Some("what is the capital of France"))));
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        orch.handle_inbound(InboundEvent::AudioChunk { audio: vec![0; 32] }, &sink)
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["transcription", "question_detection", "processing", "ai_response"]
        );
        match &events[0] {
            AssistantEvent::Transcription { confidence, .. } => assert_eq!(*confidence, 0.92),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_context_and_clear_events() {
        let orch = orchestrator(ScriptedGenerator::answering("unused"));
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        orch.handle_inbound(
            InboundEvent::Context {
                content: "quarterly budget is two million".to_string(),
                source: "user_upload".to_string(),
                metadata: serde_json::Value::Null,
            },
            &sink,
        )
        .await
        .unwrap();
        orch.handle_inbound(InboundEvent::ClearHistory, &sink).await.unwrap();
        orch.handle_inbound(InboundEvent::ClearContext, &sink).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec!["context_updated", "history_cleared", "context_updated"]
        );
        match &events[0] {
            AssistantEvent::ContextUpdated { summary, .. } => {
                assert_eq!(summary.count, 1);
                assert_eq!(summary.total_words, 5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[2] {
            AssistantEvent::ContextUpdated { summary, .. } => assert_eq!(summary.count, 0),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // ---- stores and status ----

    #[tokio::test]
    async fn test_clear_history_leaves_context() {
        let orch = orchestrator(ScriptedGenerator::answering("yes"));
        orch.add_context("some notes", "a.txt", serde_json::Value::Null).unwrap();
        let sink = EventSink::new(16);
        orch.process_fragment(&TextFragment::new("is the office open today", 0.9), &sink)
            .await
            .unwrap();

        orch.clear_history().unwrap();

        assert!(orch.history().unwrap().is_empty());
        assert_eq!(orch.context_summary().unwrap().count, 1);
    }

    #[test]
    fn test_search_context() {
        let orch = orchestrator(ScriptedGenerator::answering("unused"));
        orch.add_context("Flight BA117 departs at nine", "travel.txt", serde_json::Value::Null)
            .unwrap();
        orch.add_context("lunch menu", "menu.txt", serde_json::Value::Null).unwrap();

        let hits = orch.search_context(&["flight"]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "travel.txt");
    }

    #[test]
    fn test_status_snapshot() {
        let orch = orchestrator(ScriptedGenerator::answering("unused"));
        let status = orch.status(0).unwrap();
        assert_eq!(status.status, ListeningStatus::Idle);
        assert!(!status.is_listening);
        assert!(status.last_activity.is_none());

        orch.add_context("x", "y", serde_json::Value::Null).unwrap();
        let status = orch.status(2).unwrap();
        assert_eq!(status.status, ListeningStatus::Listening);
        assert!(status.is_listening);
        assert_eq!(status.active_sessions, 2);
        assert_eq!(status.context_entries, 1);
    }

    #[test]
    fn test_event_sink_without_listeners() {
        let sink = EventSink::new(4);
        sink.emit(AssistantEvent::Processing {
            message: "nobody hears this".to_string(),
        });
        assert!(sink.is_open());
        sink.close();
        assert!(!sink.is_open());
    }
}
