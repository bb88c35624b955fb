//! stagegate: a gated, single-flight controller for staged analysis pipelines.
//!
//! The pipeline walks through four ordered stages (load, encode, scale,
//! train). Each stage only starts once every previous stage completed and
//! nothing else is in flight. Progress, completion and the final result are
//! owned by [`PipelineController`] and exposed as read-only snapshots.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod pipeline;
pub mod tasks;

pub use config::{PipelineOptions, StageDelays};
pub use dataset::{ColumnKind, ColumnSpec, Dataset};
pub use errors::{PipelineError, PipelineResult};
pub use pipeline::{
    ExecutionPlan, FailureReason, PipelineController, PipelineEvent, PipelineState,
    PipelineStatus, ResultPayload, Stage, StageOutcome, StageTask, StageTicket, Step,
};
pub use tasks::{SimulatedPlan, TrainingReport};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log file name used when logging to a directory.
pub const LOG_FILE_NAME: &str = "stagegate.log";

/// Install the global tracing subscriber.
///
/// Logs go to stderr; when `log_dir` is given they are also written to
/// `log_dir/stagegate.log` through a non-blocking writer. Keep the returned
/// guard alive for the lifetime of the process so buffered lines are flushed.
///
/// The filter defaults to `info` and honors `RUST_LOG`.
pub fn init_logging(log_dir: Option<&Path>) -> PipelineResult<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PipelineError::Runtime(format!("failed to install logger: {e}")))?;

    Ok(guard)
}
