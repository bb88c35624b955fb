//! Task: Data load.
//!
//! Reports the dataset shape once the simulated read finishes.

use super::Simulation;
use crate::dataset::Dataset;
use crate::pipeline::{ResultPayload, Stage, StageOutcome, StageTask};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LoadTask {
    dataset: Arc<Dataset>,
    sim: Simulation,
}

impl LoadTask {
    pub fn new(dataset: Arc<Dataset>, sim: Simulation) -> Self {
        Self { dataset, sim }
    }
}

#[async_trait]
impl StageTask for LoadTask {
    async fn run(&self, stage: Stage) -> StageOutcome {
        if let Err(reason) = self.sim.work(stage, self.name()).await {
            return StageOutcome::Failure(reason);
        }

        let payload = ResultPayload::new()
            .with("dataset", self.dataset.name.clone())
            .with("rows", self.dataset.rows)
            .with("columns", self.dataset.columns.len());

        StageOutcome::with_result(payload)
    }

    fn name(&self) -> &str {
        "data_load"
    }
}
