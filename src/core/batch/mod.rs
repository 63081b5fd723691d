//! Batch orchestration: drives every record through extract, sanitize, validate and
//! deliver, strictly one at a time, and stops the run once the broker has failed too
//! many times in a row.

pub mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::config::MigrationConfig;
use crate::core::delivery::{Deliver, DeliveryOutcome, DeliveryTarget};
use crate::core::error::MigrationError;
use crate::core::sanitize::FieldSanitizer;
use crate::core::store::SourceDocument;
use crate::core::validate;
use crate::core::workdir::RunDirectory;

pub use report::{BatchReport, FailedMessage, FailureStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Processing(usize),
    Aborted { at: usize },
    Completed,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_consecutive_failures: usize,
    pub pause: Duration,
    pub sweep_on_failure: bool,
}

impl From<&MigrationConfig> for BatchSettings {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            max_consecutive_failures: config.batch.max_consecutive_failures,
            pause: config.batch.pause(),
            sweep_on_failure: config.delivery.sweep_on_failure,
        }
    }
}

/// Running tallies. Threaded through the loop by value; a delivered message resets
/// the failure streak.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub consecutive_failures: usize,
    pub failures: Vec<FailedMessage>,
}

impl BatchState {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, failure: FailedMessage) {
        self.attempted += 1;
        self.failed += 1;
        self.consecutive_failures += 1;
        self.failures.push(failure);
    }

    pub fn breaker_tripped(&self, threshold: usize) -> bool {
        self.consecutive_failures >= threshold
    }
}

/// What the loop left behind, before the staging directory is finalized.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub total: usize,
    pub state: BatchState,
    pub run_state: RunState,
}

impl BatchRun {
    pub fn into_report(
        self,
        source: &Path,
        target: &DeliveryTarget,
        retained_dir: Option<PathBuf>,
        replay_command: Option<String>,
    ) -> BatchReport {
        let aborted_at = match self.run_state {
            RunState::Aborted { at } => Some(at),
            _ => None,
        };
        BatchReport {
            source: source.to_path_buf(),
            queue: target.queue.clone(),
            broker_alias: target.broker_alias.clone(),
            total: self.total,
            attempted: self.state.attempted,
            succeeded: self.state.succeeded,
            failed: self.state.failed,
            aborted_at,
            failures: self.state.failures,
            replay_command: retained_dir.as_ref().and(replay_command),
            retained_dir,
        }
    }
}

pub struct Orchestrator<'a> {
    source: &'a SourceDocument,
    run_dir: &'a RunDirectory,
    sanitizer: &'a FieldSanitizer,
    deliverer: &'a dyn Deliver,
    target: DeliveryTarget,
    settings: BatchSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a SourceDocument,
        run_dir: &'a RunDirectory,
        sanitizer: &'a FieldSanitizer,
        deliverer: &'a dyn Deliver,
        target: DeliveryTarget,
        settings: BatchSettings,
    ) -> Self {
        Self {
            source,
            run_dir,
            sanitizer,
            deliverer,
            target,
            settings,
        }
    }

    pub async fn run(&self) -> BatchRun {
        let total = self.source.record_count();
        let mut state = BatchState::default();
        let mut run_state = RunState::Idle;
        info!(
            "Migrating {} messages from {} to queue {} ({})",
            total,
            self.source.path().display(),
            self.target.queue,
            self.target.broker_alias
        );

        for ordinal in 1..=total {
            run_state = RunState::Processing(ordinal);
            info!("[{}/{}] Processing message #{}", ordinal, total, ordinal);
            state = self.step(state, ordinal).await;

            if state.breaker_tripped(self.settings.max_consecutive_failures) {
                error!(
                    "{} consecutive failures, aborting after message #{} of {}",
                    state.consecutive_failures, ordinal, total
                );
                run_state = RunState::Aborted { at: ordinal };
                break;
            }
            if ordinal < total && !self.settings.pause.is_zero() {
                tokio::time::sleep(self.settings.pause).await;
            }
        }

        if !matches!(run_state, RunState::Aborted { .. }) {
            run_state = RunState::Completed;
        }
        BatchRun {
            total,
            state,
            run_state,
        }
    }

    async fn step(&self, mut state: BatchState, ordinal: usize) -> BatchState {
        let mut staged = match self.source.extract(ordinal, self.run_dir).await {
            Ok(staged) => staged,
            Err(e) => {
                log_pipeline_error(ordinal, "extraction", &e);
                state.record_failure(FailedMessage {
                    ordinal,
                    stage: FailureStage::Extract,
                    reason: e.to_string(),
                    staged_path: None,
                    log_path: None,
                });
                return state;
            }
        };

        if let Err(e) = self.sanitizer.sanitize_staged(&mut staged).await {
            log_pipeline_error(ordinal, "sanitize", &e);
            state.record_failure(FailedMessage {
                ordinal,
                stage: FailureStage::Sanitize,
                reason: e.to_string(),
                staged_path: Some(staged.path.clone()),
                log_path: None,
            });
            return state;
        }

        validate::validate(&staged.document, self.source.layout()).log(ordinal);

        let outcome = self.deliverer.deliver(&staged, &self.target).await;
        if outcome.success {
            info!("✓ Message #{} delivered", ordinal);
            self.run_dir.discard_artifacts(ordinal);
            state.record_success();
            return state;
        }

        state.record_failure(failure_from(&outcome));
        if self.settings.sweep_on_failure {
            self.deliverer.reclaim_orphans().await;
        }
        state
    }
}

fn failure_from(outcome: &DeliveryOutcome) -> FailedMessage {
    let (stage, reason) = match outcome.error() {
        Some(e @ MigrationError::DeliveryTimeout { .. }) => (FailureStage::Timeout, e.to_string()),
        Some(e) => (FailureStage::Deliver, e.to_string()),
        None => (FailureStage::Deliver, "unknown delivery failure".to_string()),
    };
    error!("✗ {}", reason);
    error!(
        "Client output for message #{} ({}):\n{}",
        outcome.ordinal,
        outcome.log_path.display(),
        outcome.output.trim_end()
    );
    FailedMessage {
        ordinal: outcome.ordinal,
        stage,
        reason,
        staged_path: Some(outcome.staged_path.clone()),
        log_path: Some(outcome.log_path.clone()),
    }
}

fn log_pipeline_error(ordinal: usize, stage: &str, e: &MigrationError) {
    error!("✗ Message #{}: {} failed: {}", ordinal, stage, e);
    if let MigrationError::Malformed { excerpt, .. } = e {
        warn!("First lines of message #{}:\n{}", ordinal, excerpt);
    }
}
