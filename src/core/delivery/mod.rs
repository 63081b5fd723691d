//! Delivery of one staged message through the external broker client.
//!
//! Each delivery writes a four-line command script, runs the client in command-file
//! mode with all output going to a per-message log, and polls it until it exits or
//! hits the ceiling. The verdict comes from the log text, not from the exit code.

pub mod classifier;

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::config::{ClientConfig, DeliveryConfig};
use crate::core::error::MigrationError;
use crate::core::store::StagedMessage;
use crate::core::workdir;
use crate::platform::{NativePlatform, Platform};

pub use classifier::{MarkerClassifier, OutcomeClassifier};

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub queue: String,
    pub broker_alias: String,
}

/// Result of one delivery attempt. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub ordinal: usize,
    pub staged_path: PathBuf,
    pub log_path: PathBuf,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
    /// Exit code 0 without a success marker.
    pub anomalous_exit: bool,
    pub suspected_causes: Vec<String>,
    pub elapsed_ms: u64,
}

impl DeliveryOutcome {
    /// The error this outcome represents, if it is a failure.
    pub fn error(&self) -> Option<MigrationError> {
        if self.success {
            return None;
        }
        if self.timed_out {
            return Some(MigrationError::DeliveryTimeout {
                ordinal: self.ordinal,
                secs: self.elapsed_ms / 1000,
            });
        }
        let exit = match self.exit_code {
            Some(code) => code.to_string(),
            None => "none".to_string(),
        };
        let mut reason = format!("no success marker in client output (exit code {})", exit);
        if !self.suspected_causes.is_empty() {
            reason.push_str(&format!("; suspected: {}", self.suspected_causes.join(", ")));
        }
        Some(MigrationError::DeliveryFailure {
            ordinal: self.ordinal,
            reason,
        })
    }
}

#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, staged: &StagedMessage, target: &DeliveryTarget) -> DeliveryOutcome;

    /// Kill broker client processes left behind by earlier attempts. Idempotent.
    async fn reclaim_orphans(&self);
}

/// Command script for one message, in the client's batch syntax.
pub fn render_script(target: &DeliveryTarget, staged_path: &Path) -> String {
    format!(
        "connect --broker {}\nsend-message --queue {} --file \"{}\"\ndisconnect\nexit\n",
        target.broker_alias,
        target.queue,
        staged_path.display()
    )
}

/// Command line that re-runs the kept script of one message, `<N>` standing for its
/// ordinal.
pub fn replay_template(client: &ClientConfig, work_dir: &Path) -> String {
    let script = work_dir.join(workdir::script_file(0));
    let script = script.to_string_lossy().replace("commands_0", "commands_<N>");
    std::iter::once(client.program.clone())
        .chain(client.args.iter().map(|a| a.replace("{script}", &script)))
        .collect::<Vec<_>>()
        .join(" ")
}

struct ClientRun {
    exit_code: Option<i32>,
    timed_out: bool,
    output: String,
}

/// Runs the external broker client, one process per message.
pub struct BrokerClientExecutor {
    program: String,
    args: Vec<String>,
    sweep_pattern: String,
    timeout: Duration,
    poll_interval: Duration,
    work_dir: PathBuf,
    classifier: Box<dyn OutcomeClassifier>,
}

impl BrokerClientExecutor {
    pub fn new(
        client: &ClientConfig,
        delivery: &DeliveryConfig,
        work_dir: &Path,
        classifier: Box<dyn OutcomeClassifier>,
    ) -> Self {
        Self {
            program: client.program.clone(),
            args: client.args.clone(),
            sweep_pattern: client.sweep_pattern().to_string(),
            timeout: delivery.timeout(),
            poll_interval: delivery.poll_interval(),
            work_dir: work_dir.to_path_buf(),
            classifier,
        }
    }

    async fn run_client(
        &self,
        staged: &StagedMessage,
        target: &DeliveryTarget,
        script_path: &Path,
        log_path: &Path,
    ) -> std::io::Result<ClientRun> {
        tokio::fs::write(script_path, render_script(target, &staged.path)).await?;

        let log = std::fs::File::create(log_path)?;
        let log_err = log.try_clone()?;

        let script = script_path.to_string_lossy();
        let mut cmd = NativePlatform::client_command(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace("{script}", &script)))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let started = Instant::now();

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if started.elapsed() >= self.timeout {
                warn!(
                    "Message #{}: broker client still running after {}s, killing it",
                    staged.ordinal,
                    self.timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    warn!("Message #{}: kill failed: {}", staged.ordinal, e);
                }
                break None;
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        if status.is_none() {
            let mut log = std::fs::OpenOptions::new().append(true).open(log_path)?;
            writeln!(
                log,
                "\n[mqmigrate] TIMEOUT: broker client killed after {}s",
                self.timeout.as_secs()
            )?;
        }

        let output = String::from_utf8_lossy(&tokio::fs::read(log_path).await?).into_owned();
        Ok(ClientRun {
            exit_code: status.and_then(|s| s.code()),
            timed_out: status.is_none(),
            output,
        })
    }

    fn judge(
        &self,
        staged: &StagedMessage,
        log_path: PathBuf,
        run: ClientRun,
        elapsed: Duration,
    ) -> DeliveryOutcome {
        let verdict = self.classifier.classify(&run.output);
        let success = verdict.success && !run.timed_out;
        let anomalous_exit = !success && !run.timed_out && run.exit_code == Some(0);

        if success && run.exit_code != Some(0) {
            debug!(
                "Message #{}: found {:?} despite exit code {:?}",
                staged.ordinal,
                verdict.marker.as_deref().unwrap_or_default(),
                run.exit_code
            );
        }
        if anomalous_exit {
            warn!(
                "Message #{}: broker client exited 0 but printed no success marker",
                staged.ordinal
            );
        }

        DeliveryOutcome {
            ordinal: staged.ordinal,
            staged_path: staged.path.clone(),
            log_path,
            success,
            exit_code: run.exit_code,
            output: run.output,
            timed_out: run.timed_out,
            anomalous_exit,
            suspected_causes: if success {
                Vec::new()
            } else {
                verdict.suspected_causes
            },
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

#[async_trait]
impl Deliver for BrokerClientExecutor {
    async fn deliver(&self, staged: &StagedMessage, target: &DeliveryTarget) -> DeliveryOutcome {
        let script_path = self.work_dir.join(workdir::script_file(staged.ordinal));
        let log_path = self.work_dir.join(workdir::log_file(staged.ordinal));
        info!(
            "Message #{}: sending to {} via {}",
            staged.ordinal, target.queue, target.broker_alias
        );

        let started = Instant::now();
        match self.run_client(staged, target, &script_path, &log_path).await {
            Ok(run) => self.judge(staged, log_path, run, started.elapsed()),
            Err(e) => {
                error!(
                    "Message #{}: could not run {}: {}",
                    staged.ordinal, self.program, e
                );
                let output = format!("[mqmigrate] could not run {}: {}\n", self.program, e);
                if let Err(write_err) = std::fs::write(&log_path, &output) {
                    warn!(
                        "Message #{}: could not write {}: {}",
                        staged.ordinal,
                        log_path.display(),
                        write_err
                    );
                }
                DeliveryOutcome {
                    ordinal: staged.ordinal,
                    staged_path: staged.path.clone(),
                    log_path,
                    success: false,
                    exit_code: None,
                    output,
                    timed_out: false,
                    anomalous_exit: false,
                    suspected_causes: vec![e.to_string()],
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    async fn reclaim_orphans(&self) {
        let own = std::process::id();
        let pids: Vec<u32> = NativePlatform::find_pids_matching(&self.sweep_pattern)
            .into_iter()
            .filter(|pid| *pid != own)
            .collect();
        if pids.is_empty() {
            debug!("No stray processes matching {}", self.sweep_pattern);
            return;
        }
        for pid in pids {
            match NativePlatform::force_kill(pid) {
                Ok(_) => info!("Killed stray broker client process {}", pid),
                Err(e) => debug!("Could not kill {}: {}", pid, e),
            }
        }
    }
}
