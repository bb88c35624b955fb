//! Configuration for the pipeline controller and its simulated tasks.

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound for a single simulated stage delay.
const MAX_STAGE_DELAY_MS: u64 = 10 * 60 * 1000;

/// Controller options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Latency of each simulated stage task.
    pub delays: StageDelays,

    /// Optional per-stage timeout. Expiry fails the stage like any other
    /// task failure.
    pub stage_timeout_ms: Option<u64>,

    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            delays: StageDelays::default(),
            stage_timeout_ms: None,
            event_capacity: 64,
        }
    }
}

/// Simulated latency per stage, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDelays {
    pub load_ms: u64,
    pub encode_ms: u64,
    pub scale_ms: u64,
    pub train_ms: u64,
}

impl Default for StageDelays {
    fn default() -> Self {
        Self {
            load_ms: 500,
            encode_ms: 1500,
            scale_ms: 1500,
            train_ms: 2000,
        }
    }
}

impl StageDelays {
    /// Zero latency for every stage.
    pub fn instant() -> Self {
        Self {
            load_ms: 0,
            encode_ms: 0,
            scale_ms: 0,
            train_ms: 0,
        }
    }

    fn get(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Load => self.load_ms,
            Stage::Encode => self.encode_ms,
            Stage::Scale => self.scale_ms,
            Stage::Train => self.train_ms,
        }
    }
}

impl PipelineOptions {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let options: Self = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        options.sanitize()?;
        Ok(options)
    }

    /// Validate option values.
    pub fn sanitize(&self) -> PipelineResult<()> {
        if self.event_capacity == 0 {
            return Err(PipelineError::Config(
                "event_capacity must be greater than zero".into(),
            ));
        }

        if self.stage_timeout_ms == Some(0) {
            return Err(PipelineError::Config(
                "stage_timeout_ms must be greater than zero when set".into(),
            ));
        }

        for stage in Stage::ALL {
            let delay = self.delays.get(stage);
            if delay > MAX_STAGE_DELAY_MS {
                return Err(PipelineError::Config(format!(
                    "{stage} delay {delay}ms exceeds the {MAX_STAGE_DELAY_MS}ms limit"
                )));
            }
        }

        Ok(())
    }

    pub fn delay_for(&self, stage: Stage) -> Duration {
        Duration::from_millis(self.delays.get(stage))
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_reference_latencies() {
        let options = PipelineOptions::default();
        assert_eq!(options.delay_for(Stage::Encode), Duration::from_millis(1500));
        assert_eq!(options.delay_for(Stage::Scale), Duration::from_millis(1500));
        assert_eq!(options.delay_for(Stage::Train), Duration::from_millis(2000));
        assert_eq!(options.stage_timeout(), None);
        options.sanitize().unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "delays": {{ "train_ms": 50 }}, "stage_timeout_ms": 1000 }}"#).unwrap();

        let options = PipelineOptions::from_file(file.path()).unwrap();
        assert_eq!(options.delays.train_ms, 50);
        assert_eq!(options.delays.load_ms, 500);
        assert_eq!(options.stage_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(options.event_capacity, 64);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = PipelineOptions::from_file(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_sanitize_rejects_bad_values() {
        let options = PipelineOptions {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(options.sanitize().is_err());

        let options = PipelineOptions {
            stage_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(options.sanitize().is_err());

        let mut options = PipelineOptions::default();
        options.delays.scale_ms = MAX_STAGE_DELAY_MS + 1;
        let err = options.sanitize().unwrap_err();
        assert!(err.to_string().contains("scale delay"));
    }
}
