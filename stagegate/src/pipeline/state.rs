//! Pipeline state record.
//!
//! `PipelineState` is pure data. The controller is its only writer; everyone
//! else sees cloned snapshots. Transition helpers are crate-private so
//! completion flags and progress can never be assigned from outside.

use super::stage::{Stage, Step, progress_for_completed};
use crate::errors::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-stage completion flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCompletion {
    load: bool,
    encode: bool,
    scale: bool,
    train: bool,
}

impl StageCompletion {
    pub fn is_complete(&self, stage: Stage) -> bool {
        match stage {
            Stage::Load => self.load,
            Stage::Encode => self.encode,
            Stage::Scale => self.scale,
            Stage::Train => self.train,
        }
    }

    /// Number of completed stages.
    pub fn count(&self) -> usize {
        Stage::ALL.iter().filter(|s| self.is_complete(**s)).count()
    }

    /// Highest completed stage, if any.
    pub fn highest(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .rev()
            .copied()
            .find(|s| self.is_complete(*s))
    }

    /// First stage that has not completed yet.
    pub fn first_incomplete(&self) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| !self.is_complete(*s))
    }

    fn set(&mut self, stage: Stage) {
        match stage {
            Stage::Load => self.load = true,
            Stage::Encode => self.encode = true,
            Stage::Scale => self.scale = true,
            Stage::Train => self.train = true,
        }
    }
}

/// Opaque metrics produced by stage tasks.
///
/// The controller only merges and stores it; interpretation is left to
/// consumers (see [`ResultPayload::to_typed`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultPayload(Map<String, Value>);

impl ResultPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a payload from any value that serializes to a JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> PipelineResult<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PipelineError::Config(format!(
                "result payload must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge `other` into this payload. Keys from `other` win.
    pub fn merge(&mut self, other: ResultPayload) {
        self.0.extend(other.0);
    }

    /// Deserialize the payload (or a subset of it) into a typed view.
    pub fn to_typed<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

/// Controller state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Nothing has run yet.
    Idle,
    /// A stage task is in flight.
    Running(Stage),
    /// Waiting for the consumer to start the given stage.
    Awaiting(Stage),
    /// Every stage completed.
    Complete,
}

/// Snapshot of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    current_stage: Step,
    progress: u8,
    stage_completion: StageCompletion,
    running: Option<Stage>,
    result: Option<ResultPayload>,
}

impl PipelineState {
    /// Initial state: `Load`, 0%, nothing complete, no result.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_stage(&self) -> Step {
        self.current_stage
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn stage_completion(&self) -> &StageCompletion {
        &self.stage_completion
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.stage_completion.is_complete(stage)
    }

    /// Stage currently in flight, if any.
    pub fn running(&self) -> Option<Stage> {
        self.running
    }

    pub fn result(&self) -> Option<&ResultPayload> {
        self.result.as_ref()
    }

    /// The only stage `advance()` will currently accept (ignoring single-flight).
    pub fn next_stage(&self) -> Option<Stage> {
        self.stage_completion.first_incomplete()
    }

    pub fn status(&self) -> PipelineStatus {
        if let Some(stage) = self.running {
            return PipelineStatus::Running(stage);
        }
        match self.next_stage() {
            None => PipelineStatus::Complete,
            Some(_) if self.stage_completion.count() == 0 && self.progress == 0 => {
                PipelineStatus::Idle
            }
            Some(stage) => PipelineStatus::Awaiting(stage),
        }
    }

    /// Check every structural invariant of the record.
    pub fn validate(&self) -> PipelineResult<()> {
        let completion = &self.stage_completion;

        for stage in Stage::ALL {
            if completion.is_complete(stage) {
                if let Some(prev) = stage.previous() {
                    if !completion.is_complete(prev) {
                        return Err(PipelineError::InvariantViolation(format!(
                            "stage {stage} complete while earlier stage {prev} is not"
                        )));
                    }
                }
            }
        }

        if self.result.is_some() != completion.is_complete(Stage::Train) {
            return Err(PipelineError::InvariantViolation(format!(
                "result present = {} but train complete = {}",
                self.result.is_some(),
                completion.is_complete(Stage::Train)
            )));
        }

        if self.progress > 100 {
            return Err(PipelineError::InvariantViolation(format!(
                "progress {} exceeds 100",
                self.progress
            )));
        }

        let floor = progress_for_completed(completion.count());
        if self.progress < floor {
            return Err(PipelineError::InvariantViolation(format!(
                "progress {} below completed floor {floor}",
                self.progress
            )));
        }

        if let Some(running) = self.running {
            if Some(running) != self.next_stage() {
                return Err(PipelineError::InvariantViolation(format!(
                    "running stage {running} is not the next stage"
                )));
            }
        }

        if self.current_stage != self.derived_step() {
            return Err(PipelineError::InvariantViolation(format!(
                "current stage {} inconsistent with completion (expected {})",
                self.current_stage,
                self.derived_step()
            )));
        }

        Ok(())
    }

    fn derived_step(&self) -> Step {
        if self.stage_completion.is_complete(Stage::Train) {
            return Step::Complete;
        }
        let stage = self
            .running
            .or_else(|| self.stage_completion.highest())
            .unwrap_or(Stage::Load);
        Step::At(stage)
    }

    // ------------------------------------------------------------------------
    // Transitions (controller only)
    // ------------------------------------------------------------------------

    pub(crate) fn begin(&mut self, stage: Stage) {
        self.running = Some(stage);
        self.progress = self.progress.max(stage.started_progress());
        self.current_stage = self.derived_step();
    }

    /// Mark `stage` complete. `result` is only stored when `Train` completes.
    pub(crate) fn complete(&mut self, stage: Stage, result: ResultPayload) {
        self.running = None;
        self.stage_completion.set(stage);
        self.progress = self
            .progress
            .max(progress_for_completed(self.stage_completion.count()));
        if stage == Stage::Train {
            self.result = Some(result);
        }
        self.current_stage = self.derived_step();
    }

    /// Release the running slot without recording completion.
    ///
    /// Progress keeps its started value so it never decreases.
    pub(crate) fn fail(&mut self) {
        self.running = None;
        self.current_stage = self.derived_step();
    }
}
