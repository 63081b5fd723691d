use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::error::{MigrationError, Result};

const CONFIG_FILE: &str = "mqmigrate.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MigrationConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub sanitize: SanitizeConfig,

    #[serde(default)]
    pub layout: DocumentLayout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Broker client binary, resolved through PATH when not a path.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments for command-file mode. `{script}` is replaced by the script path.
    #[serde(default = "default_client_args")]
    pub args: Vec<String>,

    /// Command-line fragment identifying stray client processes. Defaults to `program`.
    #[serde(default)]
    pub sweep_pattern: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_success_markers")]
    pub success_markers: Vec<String>,

    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub sweep_on_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,

    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// Parent of the per-run staging directory. Defaults to the system temp dir.
    #[serde(default)]
    pub work_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SanitizeConfig {
    /// Numeric properties the broker client cannot parse when empty.
    #[serde(default = "default_sanitize_fields")]
    pub fields: Vec<String>,
}

/// Element names of the exported message document.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentLayout {
    pub root: String,
    pub record: String,
    pub header: String,
    pub destination: String,
    pub message_id: String,
    pub property: String,
    pub property_name: String,
    pub property_value: String,
    pub body: String,
}

fn default_program() -> String {
    "activemq-cli".to_string()
}
fn default_client_args() -> Vec<String> {
    vec!["--cmdfile".to_string(), "{script}".to_string()]
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_success_markers() -> Vec<String> {
    vec!["Messages sent to queue".to_string()]
}
fn default_error_patterns() -> Vec<String> {
    [
        "error",
        "exception",
        "failed",
        "refused",
        "timeout",
        "timed out",
        "unable to",
        "cannot",
        "denied",
        "invalid",
        "not found",
        "NumberFormatException",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_true() -> bool {
    true
}
fn default_max_consecutive_failures() -> usize {
    5
}
fn default_pause_ms() -> u64 {
    300
}
fn default_sanitize_fields() -> Vec<String> {
    vec![
        "AMQ_SCHEDULED_DELAY".to_string(),
        "AMQ_SCHEDULED_PERIOD".to_string(),
        "AMQ_SCHEDULED_REPEAT".to_string(),
    ]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_client_args(),
            sweep_pattern: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            success_markers: default_success_markers(),
            error_patterns: default_error_patterns(),
            sweep_on_failure: true,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            pause_ms: default_pause_ms(),
            work_root: None,
        }
    }
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            fields: default_sanitize_fields(),
        }
    }
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            root: "jms-messages".to_string(),
            record: "jms-message".to_string(),
            header: "header".to_string(),
            destination: "destination".to_string(),
            message_id: "message-id".to_string(),
            property: "property".to_string(),
            property_name: "name".to_string(),
            property_value: "value".to_string(),
            body: "body".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn sweep_pattern(&self) -> &str {
        self.sweep_pattern.as_deref().unwrap_or(&self.program)
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl BatchConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl MigrationConfig {
    /// Loads the first config found: `explicit`, `./mqmigrate.toml`, then the user
    /// config dir. Missing files fall back to defaults; an explicit path must exist.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(MigrationError::Config {
                        path: p.to_path_buf(),
                        detail: "file does not exist".to_string(),
                    });
                }
                Some(p.to_path_buf())
            }
            None => Self::discover(),
        };

        let Some(path) = path else {
            info!("No {} found, using built-in defaults.", CONFIG_FILE);
            return Ok(Self::default());
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrationError::io(format!("reading {}", path.display()), e))?;
        let config = Self::parse(&content, &path)?;
        info!(
            "Loaded config {}: client={}, timeout={}s, breaker={}",
            path.display(),
            config.client.program,
            config.delivery.timeout_secs,
            config.batch.max_consecutive_failures
        );
        Ok(config)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let config: MigrationConfig =
            toml::from_str(content).map_err(|e| MigrationError::Config {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        config.validate(path)?;
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        let user = dirs::config_dir()?.join("mqmigrate").join("config.toml");
        user.exists().then_some(user)
    }

    pub fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |detail: &str| {
            Err(MigrationError::Config {
                path: path.to_path_buf(),
                detail: detail.to_string(),
            })
        };
        if self.client.program.trim().is_empty() {
            return invalid("client.program must not be empty");
        }
        if !self.client.args.iter().any(|a| a.contains("{script}")) {
            return invalid("client.args must reference {script}");
        }
        if self.delivery.timeout_secs == 0 {
            return invalid("delivery.timeout_secs must be greater than zero");
        }
        if self.delivery.poll_interval_ms == 0 {
            return invalid("delivery.poll_interval_ms must be greater than zero");
        }
        if self.delivery.success_markers.iter().all(|m| m.is_empty()) {
            return invalid("delivery.success_markers must contain a non-empty marker");
        }
        if self.batch.max_consecutive_failures == 0 {
            return invalid("batch.max_consecutive_failures must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_broker_client_conventions() {
        let config = MigrationConfig::default();
        assert_eq!(config.client.program, "activemq-cli");
        assert_eq!(config.delivery.timeout(), Duration::from_secs(30));
        assert_eq!(config.delivery.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch.pause(), Duration::from_millis(300));
        assert_eq!(config.batch.max_consecutive_failures, 5);
        assert!(
            config
                .sanitize
                .fields
                .contains(&"AMQ_SCHEDULED_DELAY".to_string())
        );
        assert!(config.validate(Path::new("defaults")).is_ok());
    }

    #[test]
    fn parse_partial_toml_keeps_other_defaults() {
        let content = r#"
[client]
program = "/opt/activemq-cli/bin/activemq-cli"

[delivery]
timeout_secs = 10
success_markers = ["Messages sent to queue", "sent 1 message"]

[layout]
record = "message"
"#;
        let config = MigrationConfig::parse(content, Path::new("mqmigrate.toml")).unwrap();
        assert_eq!(config.client.program, "/opt/activemq-cli/bin/activemq-cli");
        assert_eq!(config.client.args, vec!["--cmdfile", "{script}"]);
        assert_eq!(config.delivery.timeout_secs, 10);
        assert_eq!(config.delivery.success_markers.len(), 2);
        assert_eq!(config.delivery.poll_interval_ms, 1000);
        assert_eq!(config.layout.record, "message");
        assert_eq!(config.layout.root, "jms-messages");
    }

    #[test]
    fn parse_rejects_zero_threshold() {
        let content = "[batch]\nmax_consecutive_failures = 0\n";
        let err = MigrationConfig::parse(content, Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, MigrationError::Config { .. }));
        assert!(err.to_string().contains("max_consecutive_failures"));
    }

    #[test]
    fn parse_rejects_args_without_script_placeholder() {
        let content = "[client]\nargs = [\"--batch\"]\n";
        assert!(MigrationConfig::parse(content, Path::new("bad.toml")).is_err());
    }

    #[tokio::test]
    async fn load_explicit_missing_file_is_config_error() {
        let tmpdir = tempfile::tempdir().unwrap();
        let missing = tmpdir.path().join("nope.toml");
        let err = MigrationConfig::load(Some(&missing)).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn load_explicit_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("custom.toml");
        std::fs::write(&path, "[batch]\npause_ms = 0\n").unwrap();
        let config = MigrationConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.batch.pause_ms, 0);
    }
}
