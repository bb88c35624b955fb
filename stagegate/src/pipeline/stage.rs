//! Stage definition for the gated analysis pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One ordered step of the analysis pipeline.
///
/// Stages are totally ordered (`Load < Encode < Scale < Train`) and always
/// execute in that order. The ordering is fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Load the dataset
    Load,
    /// Label-encode categorical columns
    Encode,
    /// Scale numerical features
    Scale,
    /// Train the model
    Train,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Load, Stage::Encode, Stage::Scale, Stage::Train];

    /// Number of stages.
    pub const COUNT: usize = Self::ALL.len();

    /// Zero-based position in the execution order.
    pub fn index(self) -> usize {
        match self {
            Stage::Load => 0,
            Stage::Encode => 1,
            Stage::Scale => 2,
            Stage::Train => 3,
        }
    }

    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Progress published as soon as the stage starts.
    pub fn started_progress(self) -> u8 {
        match self {
            Stage::Load => 10,
            Stage::Encode => 35,
            Stage::Scale => 60,
            Stage::Train => 90,
        }
    }

    /// Progress once this stage (and therefore every earlier one) completed.
    pub fn completed_progress(self) -> u8 {
        progress_for_completed(self.index() + 1)
    }

    /// Human-readable label used by consumers.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Load => "Data Loading",
            Stage::Encode => "Label Encoding",
            Stage::Scale => "Feature Scaling",
            Stage::Train => "Model Training",
        }
    }
}

/// Progress value for a number of completed stages.
pub fn progress_for_completed(completed: usize) -> u8 {
    let completed = completed.min(Stage::COUNT);
    (completed * 100 / Stage::COUNT) as u8
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Encode => "encode",
            Stage::Scale => "scale",
            Stage::Train => "train",
        };
        f.write_str(name)
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "load" => Ok(Stage::Load),
            "encode" => Ok(Stage::Encode),
            "scale" => Ok(Stage::Scale),
            "train" => Ok(Stage::Train),
            other => Err(format!(
                "unknown stage '{other}' (expected load, encode, scale or train)"
            )),
        }
    }
}

/// Position of the pipeline as seen by consumers.
///
/// `At(stage)` is the highest stage that is in progress or completed (or
/// `Load` before anything ran). `Complete` follows a successful `Train`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    At(Stage),
    Complete,
}

impl Default for Step {
    fn default() -> Self {
        Step::At(Stage::Load)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::At(stage) => write!(f, "{stage}"),
            Step::Complete => f.write_str("complete"),
        }
    }
}
