//! Gated, single-flight pipeline controller.
//!
//! The controller is the only writer of [`PipelineState`]. Every mutation
//! happens under one lock together with its publication, so observers never
//! see a partially applied transition and snapshots arrive in order.
//!
//! ## Stale completions
//!
//! Each `reset()` bumps an epoch counter. A task remembers the epoch and run
//! id it was started with; when it finishes, its outcome is applied only if
//! both still match the in-flight slot. Anything else is discarded.

use super::events::{PipelineEvent, RunId};
use super::metrics::PipelineMetrics;
use super::plan::ExecutionPlan;
use super::stage::Stage;
use super::state::{PipelineState, ResultPayload};
use super::task::{BoxedStageTask, FailureReason, StageOutcome};
use crate::config::PipelineOptions;
use crate::errors::{PipelineError, PipelineResult};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Single authority for advancing, gating and resetting the pipeline.
///
/// Cheap to clone; all clones drive the same pipeline.
#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    plan: ExecutionPlan,
    options: PipelineOptions,
    runtime: Handle,
    shared: Mutex<SharedState>,
    state_tx: watch::Sender<PipelineState>,
    events_tx: broadcast::Sender<PipelineEvent>,
}

/// Everything guarded by the controller lock.
struct SharedState {
    state: PipelineState,
    epoch: u64,
    in_flight: Option<InFlight>,
    /// Partial results of completed stages, published when Train completes.
    staged: ResultPayload,
    metrics: PipelineMetrics,
}

struct InFlight {
    stage: Stage,
    run_id: RunId,
    handle: JoinHandle<()>,
}

/// Handle to an accepted `advance()` call.
///
/// Dropping the ticket does not cancel the stage.
#[derive(Debug)]
pub struct StageTicket {
    stage: Stage,
    run_id: RunId,
    done: oneshot::Receiver<PipelineResult<()>>,
}

impl StageTicket {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Wait for the stage to resolve.
    ///
    /// Returns `Cancelled` if a reset invalidated the run.
    pub async fn wait(self) -> PipelineResult<()> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Cancelled { stage: self.stage }),
        }
    }
}

impl PipelineController {
    /// Create a controller bound to the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `options` fail validation
    /// - a stage has no task bound in `plan`
    /// - called outside a Tokio runtime
    pub fn new(plan: ExecutionPlan, options: PipelineOptions) -> PipelineResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            PipelineError::Runtime(format!("pipeline controller requires a Tokio runtime: {e}"))
        })?;
        Self::with_runtime(plan, options, runtime)
    }

    /// Create a controller that spawns stage tasks on `runtime`.
    pub fn with_runtime(
        plan: ExecutionPlan,
        options: PipelineOptions,
        runtime: Handle,
    ) -> PipelineResult<Self> {
        options.sanitize()?;
        plan.validate()?;

        let state = PipelineState::new();
        let (state_tx, _) = watch::channel(state.clone());
        let (events_tx, _) = broadcast::channel(options.event_capacity);

        tracing::debug!(plan = ?plan, "Pipeline controller created");

        Ok(Self {
            inner: Arc::new(ControllerInner {
                plan,
                options,
                runtime,
                shared: Mutex::new(SharedState {
                    state,
                    epoch: 0,
                    in_flight: None,
                    staged: ResultPayload::new(),
                    metrics: PipelineMetrics::new(),
                }),
                state_tx,
                events_tx,
            }),
        })
    }

    /// Read-only snapshot of the pipeline.
    pub fn current_state(&self) -> PipelineState {
        self.inner.shared.lock().state.clone()
    }

    /// Subscribe to state changes. The receiver always holds the latest
    /// fully applied snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to per-stage events.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.inner.shared.lock().metrics.clone()
    }

    /// Start `stage`.
    ///
    /// Validation happens synchronously; the task itself runs in the
    /// background and resolves the returned ticket.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if any stage is in flight
    /// - `OutOfOrder` if `stage` is not the stage right after the highest
    ///   completed one
    pub fn advance(&self, stage: Stage) -> PipelineResult<StageTicket> {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();

        if let Some(in_flight) = &shared.in_flight {
            tracing::debug!(
                requested = %stage,
                running = %in_flight.stage,
                "Rejecting advance: a stage is already running"
            );
            return Err(PipelineError::AlreadyRunning {
                running: in_flight.stage,
            });
        }

        let expected = shared.state.next_stage();
        if expected != Some(stage) {
            tracing::debug!(requested = %stage, expected = ?expected, "Rejecting advance: out of order");
            return Err(PipelineError::OutOfOrder {
                requested: stage,
                expected,
            });
        }

        let task = inner
            .plan
            .task(stage)
            .cloned()
            .ok_or_else(|| PipelineError::Config(format!("no task bound for stage {stage}")))?;

        let mut next = shared.state.clone();
        next.begin(stage);
        next.validate()?;

        let run_id = RunId::new();
        let epoch = shared.epoch;
        shared.state = next;
        shared.metrics.record_start(stage);

        tracing::info!(
            stage = %stage,
            run_id = %run_id.short(),
            epoch,
            task = task.name(),
            "Stage started"
        );

        let (done_tx, done_rx) = oneshot::channel();
        let controller = Arc::clone(inner);
        let timeout = inner.options.stage_timeout();
        let handle = inner.runtime.spawn(async move {
            let started = Instant::now();
            let outcome = execute_task(task, stage, timeout).await;
            let result = controller.finish(stage, run_id, epoch, started, outcome);
            let _ = done_tx.send(result);
        });

        shared.in_flight = Some(InFlight {
            stage,
            run_id,
            handle,
        });

        inner.publish_state(&shared.state);
        inner.publish_event(PipelineEvent::StageStarted {
            stage,
            run_id,
            progress: shared.state.progress(),
        });

        Ok(StageTicket {
            stage,
            run_id,
            done: done_rx,
        })
    }

    /// Restore the initial state, discarding any in-flight stage.
    ///
    /// Idempotent and safe to call at any time.
    pub fn reset(&self) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();

        shared.epoch += 1;
        if let Some(in_flight) = shared.in_flight.take() {
            tracing::info!(
                stage = %in_flight.stage,
                run_id = %in_flight.run_id.short(),
                "Discarding in-flight stage on reset"
            );
            in_flight.handle.abort();
        }

        shared.state = PipelineState::new();
        shared.staged = ResultPayload::new();
        shared.metrics = PipelineMetrics::new();

        tracing::info!(epoch = shared.epoch, "Pipeline reset");

        inner.publish_state(&shared.state);
        inner.publish_event(PipelineEvent::Reset {
            epoch: shared.epoch,
        });
    }

    /// Advance every remaining stage in order, waiting for each one.
    ///
    /// Stops at the first rejection or failure.
    pub async fn run_remaining(&self) -> PipelineResult<PipelineState> {
        while let Some(stage) = self.current_state().next_stage() {
            self.advance(stage)?.wait().await?;
        }
        Ok(self.current_state())
    }
}

impl ControllerInner {
    /// Apply a task outcome. Runs on the task's own Tokio task.
    fn finish(
        &self,
        stage: Stage,
        run_id: RunId,
        epoch: u64,
        started: Instant,
        outcome: StageOutcome,
    ) -> PipelineResult<()> {
        let mut shared = self.shared.lock();

        let current_run = shared.in_flight.as_ref().map(|f| f.run_id);
        if shared.epoch != epoch || current_run != Some(run_id) {
            tracing::debug!(
                stage = %stage,
                run_id = %run_id.short(),
                run_epoch = epoch,
                epoch = shared.epoch,
                "Discarding stale stage completion"
            );
            return Err(PipelineError::Cancelled { stage });
        }

        shared.in_flight = None;
        let duration_ms = started.elapsed().as_millis();

        match outcome {
            StageOutcome::Success(partial) => {
                let mut staged = shared.staged.clone();
                if let Some(partial) = partial {
                    staged.merge(partial);
                }

                let mut next = shared.state.clone();
                next.complete(stage, staged.clone());
                if let Err(e) = next.validate() {
                    tracing::error!(stage = %stage, error = %e, "Refusing stage transition");
                    shared.state.fail();
                    self.publish_state(&shared.state);
                    return Err(e);
                }

                shared.staged = staged;
                shared.state = next;
                shared.metrics.record_success(stage, duration_ms);

                tracing::info!(
                    stage = %stage,
                    run_id = %run_id.short(),
                    duration_ms = duration_ms as u64,
                    progress = shared.state.progress(),
                    "Stage completed"
                );

                self.publish_state(&shared.state);
                self.publish_event(PipelineEvent::StageCompleted {
                    stage,
                    run_id,
                    progress: shared.state.progress(),
                    duration_ms,
                });
                if stage == Stage::Train {
                    self.publish_event(PipelineEvent::PipelineComplete { run_id });
                }
                Ok(())
            }
            StageOutcome::Failure(reason) => {
                shared.state.fail();
                shared.metrics.record_failure(stage);

                tracing::warn!(
                    stage = %stage,
                    run_id = %run_id.short(),
                    reason = %reason,
                    "Stage failed"
                );

                self.publish_state(&shared.state);
                self.publish_event(PipelineEvent::StageFailed {
                    stage,
                    run_id,
                    reason: reason.clone(),
                });
                Err(PipelineError::StageTaskFailed { stage, reason })
            }
        }
    }

    fn publish_state(&self, state: &PipelineState) {
        self.state_tx.send_replace(state.clone());
    }

    fn publish_event(&self, event: PipelineEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }
}

/// Run the task, converting timeouts and panics into failures.
async fn execute_task(
    task: BoxedStageTask,
    stage: Stage,
    timeout: Option<Duration>,
) -> StageOutcome {
    // `run` itself may panic before handing back a future.
    let run = AssertUnwindSafe(async move { task.run(stage).await }).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(caught) => caught,
            Err(_) => return StageOutcome::Failure(FailureReason::Timeout(limit)),
        },
        None => run.await,
    };

    caught.unwrap_or_else(|panic| {
        StageOutcome::Failure(FailureReason::Panicked(panic_message(panic.as_ref())))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// Compile-time assertion: controllers are shared across threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<PipelineController>;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageTask;
    use async_trait::async_trait;

    struct Instant0;

    #[async_trait]
    impl StageTask for Instant0 {
        async fn run(&self, _stage: Stage) -> StageOutcome {
            StageOutcome::success()
        }

        fn name(&self) -> &str {
            "instant"
        }
    }

    /// Never finishes on its own.
    struct Pending;

    #[async_trait]
    impl StageTask for Pending {
        async fn run(&self, _stage: Stage) -> StageOutcome {
            futures::future::pending::<()>().await;
            StageOutcome::success()
        }

        fn name(&self) -> &str {
            "pending"
        }
    }

    /// Completes its first run; every later run never finishes.
    #[derive(Default)]
    struct FirstRunOnly {
        runs: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl StageTask for FirstRunOnly {
        async fn run(&self, _stage: Stage) -> StageOutcome {
            if self.runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0 {
                futures::future::pending::<()>().await;
            }
            StageOutcome::success()
        }

        fn name(&self) -> &str {
            "first_run_only"
        }
    }

    fn plan_with(train: impl StageTask + 'static) -> ExecutionPlan {
        ExecutionPlan::new()
            .bind(Stage::Load, Instant0)
            .bind(Stage::Encode, Instant0)
            .bind(Stage::Scale, Instant0)
            .bind(Stage::Train, train)
    }

    async fn advance_to_train(controller: &PipelineController) {
        for stage in [Stage::Load, Stage::Encode, Stage::Scale] {
            controller.advance(stage).unwrap().wait().await.unwrap();
        }
    }

    #[test]
    fn test_new_requires_runtime() {
        let err = PipelineController::new(plan_with(Instant0), PipelineOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_stale_completion_after_reset_is_ignored() {
        let controller =
            PipelineController::new(plan_with(Pending), PipelineOptions::default()).unwrap();
        advance_to_train(&controller).await;

        let ticket = controller.advance(Stage::Train).unwrap();
        let stale_run = ticket.run_id();
        controller.reset();
        let after_reset = controller.current_state();

        // Deliver the old run's completion by hand, as if the abort lost the race.
        let result = controller.inner.finish(
            Stage::Train,
            stale_run,
            0,
            Instant::now(),
            StageOutcome::with_result(ResultPayload::new().with("accuracy", 0.9)),
        );

        assert!(matches!(result, Err(PipelineError::Cancelled { stage: Stage::Train })));
        assert_eq!(controller.current_state(), after_reset);
        assert_eq!(after_reset, PipelineState::new());
        assert!(matches!(
            ticket.wait().await,
            Err(PipelineError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_completion_from_previous_epoch_does_not_touch_new_run() {
        let plan = ExecutionPlan::new()
            .bind(Stage::Load, FirstRunOnly::default())
            .bind(Stage::Encode, Instant0)
            .bind(Stage::Scale, Instant0)
            .bind(Stage::Train, Pending);
        let controller = PipelineController::new(plan, PipelineOptions::default()).unwrap();
        advance_to_train(&controller).await;
        let old = controller.advance(Stage::Train).unwrap();
        controller.reset();

        // New epoch, Load run stuck in flight.
        let current = controller.advance(Stage::Load).unwrap();
        let in_flight = controller.current_state();
        assert_eq!(in_flight.running(), Some(Stage::Load));

        let result = controller.inner.finish(
            Stage::Train,
            old.run_id(),
            0,
            Instant::now(),
            StageOutcome::with_result(ResultPayload::new().with("accuracy", 0.9)),
        );
        assert!(matches!(result, Err(PipelineError::Cancelled { stage: Stage::Train })));

        let state = controller.current_state();
        assert_eq!(state, in_flight);
        assert!(!state.is_complete(Stage::Train));
        assert!(state.result().is_none());
        assert_eq!(
            controller.inner.shared.lock().in_flight.as_ref().map(|f| f.run_id),
            Some(current.run_id())
        );
        assert!(matches!(
            controller.advance(Stage::Load),
            Err(PipelineError::AlreadyRunning { running: Stage::Load })
        ));
    }

    #[tokio::test]
    async fn test_invariant_violation_refuses_transition_and_releases_slot() {
        let controller =
            PipelineController::new(plan_with(Instant0), PipelineOptions::default()).unwrap();
        let mut states = controller.subscribe();
        let run_id = RunId::new();

        // Train marked in flight while nothing before it completed.
        {
            let mut shared = controller.inner.shared.lock();
            shared.in_flight = Some(InFlight {
                stage: Stage::Train,
                run_id,
                handle: tokio::spawn(async {}),
            });
        }

        let result = controller.inner.finish(
            Stage::Train,
            run_id,
            0,
            Instant::now(),
            StageOutcome::with_result(ResultPayload::new().with("accuracy", 0.9)),
        );

        assert!(matches!(result, Err(PipelineError::InvariantViolation(_))));
        let state = controller.current_state();
        assert_eq!(state, PipelineState::new());
        assert!(state.result().is_none());
        assert!(controller.inner.shared.lock().in_flight.is_none());
        assert!(states.has_changed().unwrap());
        assert_eq!(controller.metrics().stage(Stage::Train).duration_ms, None);

        controller.advance(Stage::Load).unwrap().wait().await.unwrap();
        assert!(controller.current_state().is_complete(Stage::Load));
    }

    #[tokio::test]
    async fn test_partial_results_published_only_with_train() {
        struct Partial(&'static str);

        #[async_trait]
        impl StageTask for Partial {
            async fn run(&self, _stage: Stage) -> StageOutcome {
                StageOutcome::with_result(ResultPayload::new().with(self.0, 1))
            }

            fn name(&self) -> &str {
                self.0
            }
        }

        let plan = ExecutionPlan::new()
            .bind(Stage::Load, Partial("rows"))
            .bind(Stage::Encode, Partial("encoded"))
            .bind(Stage::Scale, Instant0)
            .bind(Stage::Train, Partial("accuracy"));
        let controller = PipelineController::new(plan, PipelineOptions::default()).unwrap();

        advance_to_train(&controller).await;
        assert!(controller.current_state().result().is_none());

        controller.advance(Stage::Train).unwrap().wait().await.unwrap();
        let state = controller.current_state();
        let result = state.result().unwrap();
        for key in ["rows", "encoded", "accuracy"] {
            assert!(result.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
