use std::path::PathBuf;

/// Everything that can go wrong while migrating a batch.
///
/// Per-message variants (`NotFound`, `Malformed`, `DeliveryFailure`, `DeliveryTimeout`)
/// are recovered by the orchestrator and folded into the report. The rest are fatal
/// and stop the run before the first delivery.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("message #{ordinal} not found (document holds {total} records)")]
    NotFound { ordinal: usize, total: usize },

    #[error("no message records found in {}", path.display())]
    NoRecords { path: PathBuf },

    #[error("message #{ordinal} is malformed: {detail}")]
    Malformed {
        ordinal: usize,
        detail: String,
        excerpt: String,
    },

    #[error("delivery of message #{ordinal} failed: {reason}")]
    DeliveryFailure { ordinal: usize, reason: String },

    #[error("delivery of message #{ordinal} timed out after {secs}s")]
    DeliveryTimeout { ordinal: usize, secs: u64 },

    #[error("required tool '{tool}' is not available ({hint})")]
    ToolMissing { tool: String, hint: String },

    #[error("invalid configuration in {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl MigrationError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MigrationError::Io {
            context: context.into(),
            source,
        }
    }

    /// Fatal errors abort before any message is attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::NoRecords { .. }
                | MigrationError::ToolMissing { .. }
                | MigrationError::Config { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
