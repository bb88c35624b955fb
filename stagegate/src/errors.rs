//! Error types for the stagegate pipeline.

use crate::pipeline::{FailureReason, Stage};
use thiserror::Error;

/// Errors surfaced by the pipeline controller and its ambient layers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The requested stage is not the next stage in order.
    #[error("stage {requested} requested out of order (expected {})", expected_label(.expected))]
    OutOfOrder {
        requested: Stage,
        expected: Option<Stage>,
    },

    /// Another stage is already in flight.
    #[error("cannot start a stage while {running} is running")]
    AlreadyRunning { running: Stage },

    /// The task bound to the stage reported a failure.
    #[error("stage {stage} failed: {reason}")]
    StageTaskFailed { stage: Stage, reason: FailureReason },

    /// The run was invalidated by a reset before it completed.
    #[error("stage {stage} was cancelled by a reset")]
    Cancelled { stage: Stage },

    /// Internal state invariant broken. Indicates a controller bug.
    #[error("pipeline invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the caller can recover by re-issuing an operation.
    ///
    /// Gating rejections and task failures leave the pipeline usable.
    /// Invariant violations do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::OutOfOrder { .. }
                | PipelineError::AlreadyRunning { .. }
                | PipelineError::StageTaskFailed { .. }
                | PipelineError::Cancelled { .. }
        )
    }
}

fn expected_label(expected: &Option<Stage>) -> String {
    match expected {
        Some(stage) => stage.to_string(),
        None => "none, pipeline complete".to_string(),
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
