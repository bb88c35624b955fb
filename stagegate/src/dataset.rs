//! Sample dataset schema processed by the simulated stages.
//!
//! Column flags are never stored: whether a column is encoded or scaled is
//! derived from the pipeline state, so a reset clears them for free.

use crate::pipeline::{PipelineState, Stage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Categorical,
    Numerical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub sample_values: Vec<String>,
}

impl ColumnSpec {
    fn new(name: &str, kind: ColumnKind, samples: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            sample_values: samples.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Processing status of one column for a given pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnStatus<'a> {
    pub name: &'a str,
    pub kind: ColumnKind,
    pub encoded: bool,
    pub scaled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub rows: u64,
    pub columns: Vec<ColumnSpec>,
}

impl Dataset {
    /// The student depression survey used by the reference workflow.
    pub fn student_depression() -> Self {
        use ColumnKind::{Categorical, Numerical};

        let columns = vec![
            ColumnSpec::new("Gender", Categorical, &["Male", "Female"]),
            ColumnSpec::new("Age", Numerical, &["18", "19", "20", "21", "22"]),
            ColumnSpec::new("City", Categorical, &["New York", "Los Angeles", "Chicago"]),
            ColumnSpec::new("Profession", Categorical, &["Student", "Engineer", "Teacher"]),
            ColumnSpec::new(
                "Sleep Duration",
                Categorical,
                &["Less than 5 hours", "5-6 hours", "7-8 hours", "More than 8 hours"],
            ),
            ColumnSpec::new("Dietary Habits", Categorical, &["Healthy", "Moderate", "Unhealthy"]),
            ColumnSpec::new("Degree", Categorical, &["Bachelor", "Master", "PhD"]),
            ColumnSpec::new("Have you ever had suicidal thoughts ?", Categorical, &["Yes", "No"]),
            ColumnSpec::new("Financial Stress", Categorical, &["Low", "Medium", "High"]),
            ColumnSpec::new("Family History of Mental Illness", Categorical, &["Yes", "No"]),
            ColumnSpec::new("Depression", Categorical, &["Yes", "No"]),
        ];

        Self {
            name: "student_depression_dataset".to_string(),
            rows: 1000,
            columns,
        }
    }

    pub fn count(&self, kind: ColumnKind) -> usize {
        self.columns.iter().filter(|c| c.kind == kind).count()
    }

    /// Per-column status derived from `state`.
    pub fn column_status<'a>(&'a self, state: &PipelineState) -> Vec<ColumnStatus<'a>> {
        let encoded = state.is_complete(Stage::Encode);
        let scaled = state.is_complete(Stage::Scale);

        self.columns
            .iter()
            .map(|c| ColumnStatus {
                name: &c.name,
                kind: c.kind,
                encoded: encoded && c.kind == ColumnKind::Categorical,
                scaled: scaled && c.kind == ColumnKind::Numerical,
            })
            .collect()
    }
}
