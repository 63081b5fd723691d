use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink shared between the subscriber and the run. The file is attached once the
/// staging directory exists; until then lines only reach the terminal.
#[derive(Clone, Default)]
pub(crate) struct RunLog {
    file: Arc<Mutex<Option<File>>>,
}

impl RunLog {
    pub fn attach(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if let Ok(mut slot) = self.file.lock() {
            *slot = Some(file);
        }
        Ok(())
    }

    /// Closes the file so the staging directory can be removed.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.file.lock() {
            *slot = None;
        }
    }
}

#[derive(Clone)]
pub(crate) struct RunLogMakeWriter {
    pub log: RunLog,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for RunLogMakeWriter {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            log: self.log.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct RunLogWriter {
    log: RunLog,
    suppress_stdout: bool,
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut slot) = self.log.file.lock()
            && let Some(file) = slot.as_mut()
        {
            let _ = file.write_all(buf); // The terminal copy still gets through
        }
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut slot) = self.log.file.lock()
            && let Some(file) = slot.as_mut()
        {
            let _ = file.flush();
        }
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

fn level_from_env() -> Level {
    match std::env::var("MQMIGRATE_LOG")
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber and returns the handle used to attach the run log.
pub(crate) fn init(quiet: bool) -> RunLog {
    let log = RunLog::default();
    let make_writer = RunLogMakeWriter {
        log: log.clone(),
        suppress_stdout: quiet,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_from_env())
        .with_target(false)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_tees_into_attached_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("migration.log");
        let log = RunLog::default();
        let make_writer = RunLogMakeWriter {
            log: log.clone(),
            suppress_stdout: true,
        };

        make_writer.make_writer().write_all(b"before\n").unwrap();
        log.attach(&path).unwrap();
        make_writer.make_writer().write_all(b"during\n").unwrap();
        log.detach();
        make_writer.make_writer().write_all(b"after\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "during\n");
    }
}
