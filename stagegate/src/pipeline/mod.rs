//! Gated staged-pipeline execution.
//!
//! This module provides:
//! - A fixed, totally ordered set of stages
//! - A table-driven plan binding each stage to one asynchronous task
//! - A controller enforcing gating, single-flight execution and safe reset
//!
//! ## Architecture
//!
//! ```text
//! Consumer ──advance(stage)──→ PipelineController ──spawn──→ StageTask
//!     ↑                              │
//!     └──── snapshots / events ──────┘  (sole writer of PipelineState)
//!
//! Idle → Load → Encode → Scale → Train → Complete
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use stagegate::pipeline::{PipelineController, Stage};
//!
//! let controller = PipelineController::new(plan, options)?;
//! controller.advance(Stage::Load)?.wait().await?;
//! controller.advance(Stage::Encode)?.wait().await?;
//! println!("progress: {}%", controller.current_state().progress());
//! ```

mod controller;
mod events;
mod metrics;
mod plan;
mod stage;
mod state;
mod task;

pub use controller::{PipelineController, StageTicket};
pub use events::{PipelineEvent, RunId};
pub use metrics::{PipelineMetrics, StageMetrics};
pub use plan::ExecutionPlan;
pub use stage::{Stage, Step, progress_for_completed};
pub use state::{PipelineState, PipelineStatus, ResultPayload, StageCompletion};
pub use task::{BoxedStageTask, FailureReason, StageOutcome, StageTask};
