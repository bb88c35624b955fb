//! Task: Model training.
//!
//! Produces a fixed [`TrainingReport`] over an 80/20 train/test split of the
//! dataset rows.

use super::Simulation;
use crate::dataset::Dataset;
use crate::pipeline::{FailureReason, ResultPayload, Stage, StageOutcome, StageTask};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Share of rows held out for evaluation, in percent.
const TEST_SPLIT_PERCENT: u64 = 20;

/// Typed view of the training metrics in the final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub accuracy: f64,
    pub f1_score: f64,
    pub train_size: u64,
    pub test_size: u64,
    pub predictions: Vec<u8>,
}

impl TrainingReport {
    fn for_rows(rows: u64) -> Self {
        let test_size = rows * TEST_SPLIT_PERCENT / 100;
        Self {
            accuracy: 0.8742,
            f1_score: 0.8156,
            train_size: rows - test_size,
            test_size,
            predictions: vec![0, 1, 0, 1, 0, 1, 1, 0, 1, 0],
        }
    }
}

pub struct TrainTask {
    dataset: Arc<Dataset>,
    sim: Simulation,
}

impl TrainTask {
    pub fn new(dataset: Arc<Dataset>, sim: Simulation) -> Self {
        Self { dataset, sim }
    }
}

#[async_trait]
impl StageTask for TrainTask {
    async fn run(&self, stage: Stage) -> StageOutcome {
        if let Err(reason) = self.sim.work(stage, self.name()).await {
            return StageOutcome::Failure(reason);
        }

        let report = TrainingReport::for_rows(self.dataset.rows);
        match ResultPayload::from_serializable(&report) {
            Ok(payload) => StageOutcome::with_result(payload),
            Err(e) => StageOutcome::Failure(FailureReason::Message(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "model_training"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_split_matches_reference_sizes() {
        let report = TrainingReport::for_rows(1000);
        assert_eq!(report.train_size, 800);
        assert_eq!(report.test_size, 200);
        assert_eq!(report.predictions.len(), 10);
    }

    #[tokio::test]
    async fn test_train_payload_round_trips_to_report() {
        let task = TrainTask::new(
            Arc::new(Dataset::student_depression()),
            Simulation::new(Duration::ZERO),
        );

        let StageOutcome::Success(Some(payload)) = task.run(Stage::Train).await else {
            panic!("training should succeed with a payload");
        };
        let report: TrainingReport = payload.to_typed().unwrap();
        assert_eq!(report.accuracy, 0.8742);
        assert_eq!(report.f1_score, 0.8156);
    }
}
