use std::path::Path;

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Build a **tokio** `Command` that launches the broker client `program`.
    fn client_command(program: &str) -> tokio::process::Command;

    /// Return PIDs of processes whose command line contains `pattern`.
    fn find_pids_matching(pattern: &str) -> Vec<u32>;

    /// Send a non-catchable termination to the process identified by `pid`.
    fn force_kill(pid: u32) -> std::io::Result<std::process::Output>;

    /// File names under which `program` may appear on `PATH`.
    fn executable_candidates(program: &str) -> Vec<String>;

    /// Whether `path` is a file this platform can execute.
    fn is_executable(path: &Path) -> bool;

    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
