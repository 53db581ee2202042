//! Answer generation and orchestration for Hush.
//!
//! Wires the question detector, the context stores and an external
//! generation backend into the per-fragment response pipeline, and manages
//! the client sessions that feed it.

pub mod error;
pub mod generator;
pub mod openai;
pub mod orchestrator;
pub mod postprocess;
pub mod session;
pub mod state;
pub mod transcriber;

pub use error::{AssistError, GenerationError};
pub use generator::{GenerationRequest, Generator};
pub use openai::OpenAiGenerator;
pub use orchestrator::{EventSink, PipelineOutcome, ResponseOrchestrator, VoiceOutcome};
pub use session::{SessionManager, PASSIVE_LISTENING};
pub use state::PipelineState;
pub use transcriber::{Transcriber, Transcript};
