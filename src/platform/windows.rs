use std::path::Path;

use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn client_command(program: &str) -> tokio::process::Command {
        let lower = program.to_ascii_lowercase();
        if lower.ends_with(".bat") || lower.ends_with(".cmd") {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg(program);
            cmd
        } else {
            tokio::process::Command::new(program)
        }
    }

    fn find_pids_matching(pattern: &str) -> Vec<u32> {
        let image = Path::new(pattern)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| pattern.to_string());
        let Ok(output) = std::process::Command::new("tasklist")
            .args(["/FO", "CSV", "/NH"])
            .output()
        else {
            return Vec::new();
        };
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines()
            .filter_map(|line| {
                let mut cols = line.split(',').map(|c| c.trim_matches('"'));
                let name = cols.next()?;
                let pid = cols.next()?.parse().ok()?;
                name.to_ascii_lowercase()
                    .starts_with(&image.to_ascii_lowercase())
                    .then_some(pid)
            })
            .collect()
    }

    fn force_kill(pid: u32) -> std::io::Result<std::process::Output> {
        std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
    }

    fn executable_candidates(program: &str) -> Vec<String> {
        if Path::new(program).extension().is_some() {
            return vec![program.to_string()];
        }
        ["exe", "bat", "cmd"]
            .iter()
            .map(|ext| format!("{}.{}", program, ext))
            .collect()
    }

    fn is_executable(path: &Path) -> bool {
        // On Windows, executability is determined by file extension, not permissions.
        path.is_file()
    }

    fn restrict_dir_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }
}
