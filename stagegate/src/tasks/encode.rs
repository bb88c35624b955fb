//! Task: Label encoding of categorical columns.

use super::Simulation;
use crate::dataset::{ColumnKind, Dataset};
use crate::pipeline::{ResultPayload, Stage, StageOutcome, StageTask};
use async_trait::async_trait;
use std::sync::Arc;

pub struct EncodeTask {
    dataset: Arc<Dataset>,
    sim: Simulation,
}

impl EncodeTask {
    pub fn new(dataset: Arc<Dataset>, sim: Simulation) -> Self {
        Self { dataset, sim }
    }
}

#[async_trait]
impl StageTask for EncodeTask {
    async fn run(&self, stage: Stage) -> StageOutcome {
        if let Err(reason) = self.sim.work(stage, self.name()).await {
            return StageOutcome::Failure(reason);
        }

        let encoded = self.dataset.count(ColumnKind::Categorical);
        tracing::debug!(columns = encoded, "Label encoded categorical columns");

        StageOutcome::with_result(ResultPayload::new().with("encoded_columns", encoded))
    }

    fn name(&self) -> &str {
        "label_encoding"
    }
}
