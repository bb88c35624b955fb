//! stagegate CLI
//!
//! Drives the simulated analysis pipeline from a terminal: runs each stage in
//! order, retries failed stages, and prints progress and the final result.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use stagegate::{
    Dataset, PipelineController, PipelineError, PipelineOptions, PipelineState, SimulatedPlan,
    Stage, StageDelays, TrainingReport, init_logging,
};

#[derive(Parser)]
#[command(name = "stagegate")]
#[command(about = "Run the gated data analysis pipeline", long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage in order (default if no command specified)
    Run {
        /// Inject failures: STAGE or STAGE:N (fail the first N attempts)
        #[arg(long = "fail", value_parser = parse_failure)]
        failures: Vec<(Stage, u32)>,

        /// Reset the pipeline once after this stage completes
        #[arg(long)]
        reset_after: Option<Stage>,

        /// Attempts per stage before giving up
        #[arg(long, default_value_t = 3)]
        attempts: u32,

        /// Skip simulated latency
        #[arg(long)]
        instant: bool,

        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn parse_failure(value: &str) -> std::result::Result<(Stage, u32), String> {
    match value.split_once(':') {
        Some((stage, count)) => {
            let count = count
                .parse::<u32>()
                .map_err(|e| format!("invalid failure count '{count}': {e}"))?;
            Ok((stage.parse()?, count))
        }
        None => Ok((value.parse()?, 1)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_dir.as_deref())?;

    let options = match &cli.config {
        Some(path) => PipelineOptions::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineOptions::default(),
    };

    match cli.command {
        None => {
            run_command(options, RunArgs::default()).await?;
        }

        Some(Commands::Run {
            failures,
            reset_after,
            attempts,
            instant,
            json,
        }) => {
            let args = RunArgs {
                failures,
                reset_after,
                attempts,
                instant,
                json,
            };
            run_command(options, args).await?;
        }

        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
    }

    Ok(())
}

struct RunArgs {
    failures: Vec<(Stage, u32)>,
    reset_after: Option<Stage>,
    attempts: u32,
    instant: bool,
    json: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            failures: Vec::new(),
            reset_after: None,
            attempts: 3,
            instant: false,
            json: false,
        }
    }
}

async fn run_command(mut options: PipelineOptions, args: RunArgs) -> Result<()> {
    if args.attempts == 0 {
        bail!("--attempts must be at least 1");
    }
    if args.instant {
        options.delays = StageDelays::instant();
    }

    let dataset = Arc::new(Dataset::student_depression());
    let plan = args
        .failures
        .iter()
        .fold(
            SimulatedPlan::new(&options).dataset(Arc::clone(&dataset)),
            |plan, (stage, n)| plan.fail_first(*stage, *n),
        )
        .build();
    let controller = PipelineController::new(plan, options)?;

    println!(
        "Dataset: {} ({} rows, {} columns)",
        dataset.name,
        dataset.rows,
        dataset.columns.len()
    );

    let mut pending_reset = args.reset_after;
    while let Some(stage) = controller.current_state().next_stage() {
        run_stage(&controller, stage, args.attempts).await?;

        if pending_reset == Some(stage) {
            pending_reset = None;
            controller.reset();
            println!("Pipeline reset after {stage}");
            print_progress(&controller.current_state());
        }
    }

    let state = controller.current_state();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_summary(&state, &dataset)?;
    }

    Ok(())
}

/// Run one stage, retrying failures up to `attempts` times.
async fn run_stage(controller: &PipelineController, stage: Stage, attempts: u32) -> Result<()> {
    for attempt in 1..=attempts {
        let ticket = controller.advance(stage)?;
        println!("Running {} (attempt {attempt}/{attempts})", stage.label());
        print_progress(&controller.current_state());

        match ticket.wait().await {
            Ok(()) => {
                print_progress(&controller.current_state());
                return Ok(());
            }
            Err(PipelineError::StageTaskFailed { reason, .. }) => {
                println!("  {} failed: {reason}", stage.label());
            }
            Err(e) => return Err(e.into()),
        }
    }

    bail!("{} failed after {attempts} attempts", stage.label())
}

fn print_progress(state: &PipelineState) {
    let filled = usize::from(state.progress()) / 5;
    println!(
        "  [{:<20}] {:>3}% ({})",
        "#".repeat(filled),
        state.progress(),
        state.current_stage()
    );
}

fn print_summary(state: &PipelineState, dataset: &Dataset) -> Result<()> {
    println!();
    println!("Columns:");
    for column in dataset.column_status(state) {
        let mut flags = Vec::new();
        if column.encoded {
            flags.push("encoded");
        }
        if column.scaled {
            flags.push("scaled");
        }
        println!("  {:<40} {:?} {}", column.name, column.kind, flags.join(", "));
    }

    let result = state
        .result()
        .context("pipeline finished without a result")?;
    let report: TrainingReport = result.to_typed()?;

    println!();
    println!("Model Performance:");
    println!("  Accuracy:  {:.1}%", report.accuracy * 100.0);
    println!("  F1 score:  {:.3}", report.f1_score);
    println!("  Train set: {}", report.train_size);
    println!("  Test set:  {}", report.test_size);
    println!("  y_pred = {:?}", report.predictions);
    Ok(())
}
