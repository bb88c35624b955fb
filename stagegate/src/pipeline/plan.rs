//! Table-driven execution plan: which task runs for which stage.

use super::stage::Stage;
use super::task::{BoxedStageTask, StageTask};
use crate::errors::{PipelineError, PipelineResult};
use std::sync::Arc;

/// Binding of every [`Stage`] to the task that performs it.
#[derive(Clone, Default)]
pub struct ExecutionPlan {
    tasks: [Option<BoxedStageTask>; Stage::COUNT],
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `task` to `stage`, replacing any previous binding.
    pub fn bind<T>(mut self, stage: Stage, task: T) -> Self
    where
        T: StageTask + 'static,
    {
        self.tasks[stage.index()] = Some(Arc::new(task));
        self
    }

    pub fn task(&self, stage: Stage) -> Option<&BoxedStageTask> {
        self.tasks[stage.index()].as_ref()
    }

    /// Ensure every stage has a task.
    pub(crate) fn validate(&self) -> PipelineResult<()> {
        let missing: Vec<String> = Stage::ALL
            .iter()
            .filter(|s| self.task(**s).is_none())
            .map(|s| s.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Config(format!(
                "no task bound for stage(s): {}",
                missing.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_map();
        for stage in Stage::ALL {
            list.entry(&stage, &self.task(stage).map(|t| t.name()));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageOutcome;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl StageTask for Noop {
        async fn run(&self, _stage: Stage) -> StageOutcome {
            StageOutcome::success()
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn test_missing_binding_is_rejected() {
        let plan = ExecutionPlan::new()
            .bind(Stage::Load, Noop)
            .bind(Stage::Train, Noop);

        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("encode, scale"));
    }

    #[test]
    fn test_full_plan_validates() {
        let plan = Stage::ALL
            .iter()
            .fold(ExecutionPlan::new(), |plan, stage| plan.bind(*stage, Noop));
        plan.validate().unwrap();
        assert_eq!(plan.task(Stage::Scale).unwrap().name(), "noop");
    }
}
