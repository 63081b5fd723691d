use serde::Serialize;
use std::path::{Path, PathBuf};

/// A message that did not make it, with the files needed to replay it by hand.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedMessage {
    pub ordinal: usize,
    pub stage: FailureStage,
    pub reason: String,
    pub staged_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extract,
    Sanitize,
    Deliver,
    Timeout,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Extract => "extract",
            FailureStage::Sanitize => "sanitize",
            FailureStage::Deliver => "deliver",
            FailureStage::Timeout => "timeout",
        }
    }
}

/// Totals for one run, including runs cut short by the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub source: PathBuf,
    pub queue: String,
    pub broker_alias: String,
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ordinal that tripped the breaker.
    pub aborted_at: Option<usize>,
    pub failures: Vec<FailedMessage>,
    /// Staging directory, kept only when something failed.
    pub retained_dir: Option<PathBuf>,
    /// Template for replaying one ordinal, with `<N>` as placeholder.
    pub replay_command: Option<String>,
}

impl BatchReport {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 * 100.0 / self.total as f64
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    /// Exit status for the process: the failure count, capped so it never wraps to 0.
    pub fn exit_code(&self) -> i32 {
        self.failed.min(255) as i32
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}
