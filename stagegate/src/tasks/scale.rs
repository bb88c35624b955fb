//! Task: Standard scaling of numerical columns.

use super::Simulation;
use crate::dataset::{ColumnKind, Dataset};
use crate::pipeline::{ResultPayload, Stage, StageOutcome, StageTask};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ScaleTask {
    dataset: Arc<Dataset>,
    sim: Simulation,
}

impl ScaleTask {
    pub fn new(dataset: Arc<Dataset>, sim: Simulation) -> Self {
        Self { dataset, sim }
    }
}

#[async_trait]
impl StageTask for ScaleTask {
    async fn run(&self, stage: Stage) -> StageOutcome {
        if let Err(reason) = self.sim.work(stage, self.name()).await {
            return StageOutcome::Failure(reason);
        }

        let scaled = self.dataset.count(ColumnKind::Numerical);
        StageOutcome::with_result(ResultPayload::new().with("scaled_columns", scaled))
    }

    fn name(&self) -> &str {
        "feature_scaling"
    }
}
