//! Notifications published by the controller.

use super::stage::Stage;
use super::task::FailureReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one accepted `advance()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Short form for log lines (last 8 characters).
    pub fn short(&self) -> String {
        let s = self.0.to_string();
        s[s.len() - 8..].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-stage lifecycle events.
///
/// Delivered over a broadcast channel; slow receivers may observe
/// `RecvError::Lagged` and should fall back to `current_state()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
        run_id: RunId,
        progress: u8,
    },
    StageCompleted {
        stage: Stage,
        run_id: RunId,
        progress: u8,
        duration_ms: u128,
    },
    StageFailed {
        stage: Stage,
        run_id: RunId,
        reason: FailureReason,
    },
    /// Train completed and the result was published.
    PipelineComplete { run_id: RunId },
    Reset { epoch: u64 },
}
