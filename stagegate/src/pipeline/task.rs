//! Stage task trait for pipeline execution.

use super::stage::Stage;
use super::state::ResultPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a stage task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Task-reported failure.
    Message(String),
    /// The stage exceeded the configured timeout.
    Timeout(#[serde(with = "duration_ms")] Duration),
    /// The task panicked; the payload message is preserved when available.
    Panicked(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Message(msg) => f.write_str(msg),
            FailureReason::Timeout(d) => write!(f, "timed out after {}ms", d.as_millis()),
            FailureReason::Panicked(msg) => write!(f, "task panicked: {msg}"),
        }
    }
}

/// Result of running a stage task.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Stage work finished, optionally contributing to the final result.
    Success(Option<ResultPayload>),
    /// Stage work failed; the pipeline stays gated at this stage.
    Failure(FailureReason),
}

impl StageOutcome {
    pub fn success() -> Self {
        StageOutcome::Success(None)
    }

    pub fn with_result(payload: ResultPayload) -> Self {
        StageOutcome::Success(Some(payload))
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        StageOutcome::Failure(FailureReason::Message(msg.into()))
    }
}

/// Trait for the deferred work bound to one stage.
///
/// Implementations may perform real computation or simulate it; the
/// controller does not care which. `run` is never called concurrently: the
/// controller allows a single in-flight stage for the whole pipeline.
#[async_trait]
pub trait StageTask: Send + Sync {
    /// Execute the work for `stage`.
    async fn run(&self, stage: Stage) -> StageOutcome;

    /// Get human-readable task name for logging.
    fn name(&self) -> &str;
}

pub type BoxedStageTask = Arc<dyn StageTask>;

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
