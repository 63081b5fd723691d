use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn client_command(program: &str) -> tokio::process::Command {
        tokio::process::Command::new(program)
    }

    fn find_pids_matching(pattern: &str) -> Vec<u32> {
        let Ok(output) = std::process::Command::new("pgrep")
            .arg("-f")
            .arg(pattern)
            .output()
        else {
            return Vec::new();
        };
        let Ok(text) = String::from_utf8(output.stdout) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }

    fn force_kill(pid: u32) -> std::io::Result<std::process::Output> {
        // SIGKILL: a hung client may ignore SIGTERM.
        std::process::Command::new("kill")
            .arg("-9")
            .arg(pid.to_string())
            .output()
    }

    fn executable_candidates(program: &str) -> Vec<String> {
        vec![program.to_string()]
    }

    fn is_executable(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    fn restrict_dir_permissions(path: &Path) {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_pattern_finds_nothing() {
        let pattern = format!("mqmigrate-no-such-process-{}", uuid::Uuid::new_v4());
        let own = std::process::id();
        assert!(
            NativePlatform::find_pids_matching(&pattern)
                .iter()
                .all(|pid| *pid != own)
        );
    }

    #[test]
    fn executable_bit_is_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("client.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(!NativePlatform::is_executable(&script));
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(NativePlatform::is_executable(&script));
        assert!(!NativePlatform::is_executable(tmp.path()));
    }
}
