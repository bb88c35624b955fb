//! Simulated stage tasks.
//!
//! Each task sleeps for its configured latency and then reports a fixed
//! outcome computed from the dataset schema. They stand in for real
//! preprocessing and training and satisfy the same [`StageTask`] contract.
//!
//! ```text
//! Load    (dataset shape)
//! Encode  (categorical columns)
//! Scale   (numerical columns)
//! Train   (TrainingReport)
//! ```
//!
//! [`StageTask`]: crate::pipeline::StageTask

mod encode;
mod load;
mod scale;
mod train;

pub use encode::EncodeTask;
pub use load::LoadTask;
pub use scale::ScaleTask;
pub use train::{TrainTask, TrainingReport};

use crate::config::PipelineOptions;
use crate::dataset::Dataset;
use crate::pipeline::{ExecutionPlan, FailureReason, Stage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Latency and failure injection shared by all simulated tasks.
#[derive(Debug)]
pub struct Simulation {
    delay: Duration,
    fail_remaining: AtomicU32,
}

impl Simulation {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_remaining: AtomicU32::new(0),
        }
    }

    /// Fail the first `attempts` runs, then succeed.
    pub fn failing_first(self, attempts: u32) -> Self {
        self.fail_remaining.store(attempts, Ordering::SeqCst);
        self
    }

    /// Wait out the simulated latency, then consume one injected failure if any.
    async fn work(&self, stage: Stage, task_name: &str) -> Result<(), FailureReason> {
        tracing::debug!(
            stage = %stage,
            task = task_name,
            delay_ms = self.delay.as_millis() as u64,
            "Simulated task started"
        );

        tokio::time::sleep(self.delay).await;

        let injected = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!(stage = %stage, task = task_name, "Injected failure");
            return Err(FailureReason::Message(format!(
                "{task_name}: simulated failure"
            )));
        }

        Ok(())
    }
}

/// Builds an [`ExecutionPlan`] of simulated tasks.
#[derive(Debug, Clone)]
pub struct SimulatedPlan {
    options: PipelineOptions,
    dataset: Arc<Dataset>,
    failures: [u32; Stage::COUNT],
}

impl SimulatedPlan {
    pub fn new(options: &PipelineOptions) -> Self {
        Self {
            options: options.clone(),
            dataset: Arc::new(Dataset::student_depression()),
            failures: [0; Stage::COUNT],
        }
    }

    pub fn dataset(mut self, dataset: Arc<Dataset>) -> Self {
        self.dataset = dataset;
        self
    }

    /// Make `stage` fail its first `attempts` runs.
    pub fn fail_first(mut self, stage: Stage, attempts: u32) -> Self {
        self.failures[stage.index()] = attempts;
        self
    }

    pub fn build(self) -> ExecutionPlan {
        let sim = |stage: Stage| {
            Simulation::new(self.options.delay_for(stage)).failing_first(self.failures[stage.index()])
        };

        ExecutionPlan::new()
            .bind(Stage::Load, LoadTask::new(Arc::clone(&self.dataset), sim(Stage::Load)))
            .bind(
                Stage::Encode,
                EncodeTask::new(Arc::clone(&self.dataset), sim(Stage::Encode)),
            )
            .bind(
                Stage::Scale,
                ScaleTask::new(Arc::clone(&self.dataset), sim(Stage::Scale)),
            )
            .bind(
                Stage::Train,
                TrainTask::new(Arc::clone(&self.dataset), sim(Stage::Train)),
            )
    }
}
