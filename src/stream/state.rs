use std::fmt;

use serde::Serialize;

/// Progress reported while the feeder has not declared its text final.
const UNFINISHED_PROGRESS_CAP: f64 = 0.99;

/// Public lifecycle of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStage {
    Idle,
    Thinking,
    Streaming,
    Complete,
    Aborted,
    Error,
}

impl StreamStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StreamStage::Idle => "idle",
            StreamStage::Thinking => "thinking",
            StreamStage::Streaming => "streaming",
            StreamStage::Complete => "complete",
            StreamStage::Aborted => "aborted",
            StreamStage::Error => "error",
        }
    }

    /// A session is running in this stage.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, StreamStage::Thinking | StreamStage::Streaming)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamStage::Complete | StreamStage::Aborted | StreamStage::Error
        )
    }

    /// Edges of the lifecycle graph. Terminal stages only leave through a
    /// reset, which is not an edge.
    #[must_use]
    pub fn can_transition_to(self, next: StreamStage) -> bool {
        use StreamStage::{Aborted, Complete, Error, Idle, Streaming, Thinking};
        matches!(
            (self, next),
            (Idle, Thinking)
                | (Thinking, Streaming)
                // instant sessions skip the paced stage
                | (Thinking, Complete)
                | (Streaming, Complete)
                | (Thinking | Streaming, Aborted)
                | (Thinking | Streaming, Error)
        )
    }
}

impl fmt::Display for StreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid stage transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: StreamStage,
    pub to: StreamStage,
}

/// Synchronous view of the current session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingState {
    pub is_active: bool,
    pub stage: StreamStage,
    /// Consumed bytes over total bytes; never decreases within a session.
    pub progress: f64,
    pub buffer_length: usize,
    pub target_length: usize,
}

/// Stage plus progress bookkeeping for one assembler.
#[derive(Debug)]
pub struct StageMachine {
    stage: StreamStage,
    progress: f64,
    buffer_length: usize,
    target_length: usize,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: StreamStage::Idle,
            progress: 0.0,
            buffer_length: 0,
            target_length: 0,
        }
    }

    #[must_use]
    pub fn stage(&self) -> StreamStage {
        self.stage
    }

    /// Move to `to`, returning the stage left behind.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for edges the lifecycle does not have.
    pub fn transition(&mut self, to: StreamStage) -> Result<StreamStage, InvalidTransition> {
        let from = self.stage;
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }
        self.stage = to;
        Ok(from)
    }

    /// Back to `idle` with zeroed progress, from any stage.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record buffer growth. `target_final` says whether `target_length` is
    /// the full size of the source or only what has been fed so far.
    pub fn record_progress(&mut self, buffer_length: usize, target_length: usize, target_final: bool) {
        self.buffer_length = buffer_length;
        self.target_length = target_length;
        #[allow(clippy::cast_precision_loss)]
        let mut ratio = if target_length == 0 {
            if target_final {
                1.0
            } else {
                0.0
            }
        } else {
            (buffer_length as f64 / target_length as f64).min(1.0)
        };
        if !target_final {
            ratio = ratio.min(UNFINISHED_PROGRESS_CAP);
        }
        self.progress = self.progress.max(ratio);
    }

    #[must_use]
    pub fn snapshot(&self) -> StreamingState {
        StreamingState {
            is_active: self.stage.is_active(),
            stage: self.stage,
            progress: self.progress,
            buffer_length: self.buffer_length,
            target_length: self.target_length,
        }
    }
}
