use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::error::{MigrationError, Result};
use crate::platform::{NativePlatform, Platform};

pub fn staged_file(ordinal: usize) -> String {
    format!("message_{}.xml", ordinal)
}

pub fn script_file(ordinal: usize) -> String {
    format!("commands_{}.txt", ordinal)
}

pub fn log_file(ordinal: usize) -> String {
    format!("delivery_{}.log", ordinal)
}

/// Per-run staging directory: staged documents, command scripts and delivery logs.
///
/// Named `mqmigrate_<pid>_<token>` so two runs never share one, even inside a single
/// process.
#[derive(Debug)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    pub fn create(root: &Path) -> Result<Self> {
        let token = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let path = root.join(format!("mqmigrate_{}_{}", std::process::id(), token));
        std::fs::create_dir_all(&path)
            .map_err(|e| MigrationError::io(format!("creating {}", path.display()), e))?;
        NativePlatform::restrict_dir_permissions(&path);
        info!("Staging directory: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn staged_path(&self, ordinal: usize) -> PathBuf {
        self.path.join(staged_file(ordinal))
    }

    pub fn script_path(&self, ordinal: usize) -> PathBuf {
        self.path.join(script_file(ordinal))
    }

    pub fn log_path(&self, ordinal: usize) -> PathBuf {
        self.path.join(log_file(ordinal))
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.path.join("migration.log")
    }

    pub fn report_path(&self) -> PathBuf {
        self.path.join("report.json")
    }

    /// Drops the artifacts of a delivered message. Nothing left to inspect there.
    pub fn discard_artifacts(&self, ordinal: usize) {
        for path in [
            self.staged_path(ordinal),
            self.script_path(ordinal),
            self.log_path(ordinal),
        ] {
            if path.exists()
                && let Err(e) = std::fs::remove_file(&path)
            {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    /// Removes the directory when the run had no failures, otherwise keeps it and
    /// returns its path for the operator.
    pub fn finish(self, failed: usize) -> Option<PathBuf> {
        if failed > 0 {
            info!(
                "Keeping staging directory {} ({} failed)",
                self.path.display(),
                failed
            );
            return Some(self.path);
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Could not remove {}: {}", self.path.display(), e);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_runs_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = RunDirectory::create(root.path()).unwrap();
        let b = RunDirectory::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(
            a.path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&format!("mqmigrate_{}_", std::process::id()))
        );
    }

    #[test]
    fn finish_removes_clean_run() {
        let root = tempfile::tempdir().unwrap();
        let dir = RunDirectory::create(root.path()).unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(dir.staged_path(1), "<x/>").unwrap();
        assert_eq!(dir.finish(0), None);
        assert!(!path.exists());
    }

    #[test]
    fn finish_keeps_failed_run() {
        let root = tempfile::tempdir().unwrap();
        let dir = RunDirectory::create(root.path()).unwrap();
        let path = dir.path().to_path_buf();
        assert_eq!(dir.finish(2), Some(path.clone()));
        assert!(path.is_dir());
    }

    #[test]
    fn discard_artifacts_only_touches_one_ordinal() {
        let root = tempfile::tempdir().unwrap();
        let dir = RunDirectory::create(root.path()).unwrap();
        for i in [1, 2] {
            std::fs::write(dir.staged_path(i), "<x/>").unwrap();
            std::fs::write(dir.log_path(i), "log").unwrap();
        }
        dir.discard_artifacts(1);
        assert!(!dir.staged_path(1).exists());
        assert!(!dir.log_path(1).exists());
        assert!(dir.staged_path(2).exists());
        assert!(dir.log_path(2).exists());
    }
}
