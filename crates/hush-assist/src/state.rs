//! Per-fragment pipeline states.
//!
//! IDLE -> CLASSIFYING -> REJECTED -> IDLE
//! IDLE -> CLASSIFYING -> RESPONDING -> IDLE
//! CLASSIFYING -> IDLE (noise)

use std::fmt;

/// Where a fragment is in the response pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Classifying,
    Rejected,
    Responding,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (PipelineState::Idle, PipelineState::Classifying)
                | (PipelineState::Classifying, PipelineState::Idle)
                | (PipelineState::Classifying, PipelineState::Rejected)
                | (PipelineState::Classifying, PipelineState::Responding)
                | (PipelineState::Rejected, PipelineState::Idle)
                | (PipelineState::Responding, PipelineState::Idle)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Classifying => "classifying",
            PipelineState::Rejected => "rejected",
            PipelineState::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Tracks one fragment's walk through the pipeline.
#[derive(Debug)]
pub(crate) struct Pipeline {
    state: PipelineState,
}

impl Pipeline {
    pub(crate) fn start() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `next`. Invalid transitions are a programming error and are
    /// logged, not propagated.
    pub(crate) fn advance(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            tracing::error!(from = %self.state, to = %next, "Invalid pipeline transition");
            debug_assert!(false, "invalid pipeline transition {} -> {}", self.state, next);
        }
        tracing::trace!(from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
    }
}
