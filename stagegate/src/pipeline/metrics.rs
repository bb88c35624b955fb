use super::stage::Stage;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub stage: Stage,
    /// Number of times the stage was started in the current epoch.
    pub attempts: u32,
    pub failures: u32,
    /// Duration of the successful attempt.
    pub duration_ms: Option<u128>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageMetrics {
    pub(crate) fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempts: 0,
            failures: 0,
            duration_ms: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub(crate) fn new() -> Self {
        Self {
            total_duration_ms: 0,
            stages: Stage::ALL.iter().map(|s| StageMetrics::new(*s)).collect(),
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageMetrics {
        &self.stages[stage.index()]
    }

    pub fn stage_duration_ms(&self, stage: Stage) -> Option<u128> {
        self.stage(stage).duration_ms
    }

    pub(crate) fn record_start(&mut self, stage: Stage) {
        self.stages[stage.index()].attempts += 1;
    }

    pub(crate) fn record_success(&mut self, stage: Stage, duration_ms: u128) {
        let entry = &mut self.stages[stage.index()];
        entry.duration_ms = Some(duration_ms);
        entry.completed_at = Some(Utc::now());
        self.total_duration_ms += duration_ms;
    }

    pub(crate) fn record_failure(&mut self, stage: Stage) {
        self.stages[stage.index()].failures += 1;
    }
}
