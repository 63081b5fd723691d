use std::path::{Path, PathBuf};

use crate::core::config::MigrationConfig;
use crate::core::error::{MigrationError, Result};
use crate::core::terminal::{print_step, print_success};
use crate::platform::{NativePlatform, Platform};

/// Resolves `program` the way a shell would: as a path when it contains a separator,
/// otherwise through `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return NativePlatform::is_executable(as_path).then(|| as_path.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| {
            NativePlatform::executable_candidates(program)
                .into_iter()
                .map(move |name| dir.join(name))
        })
        .find(|candidate| NativePlatform::is_executable(candidate))
}

/// Checks the broker client and the input document before anything is staged.
pub fn preflight(config: &MigrationConfig, input: &Path) -> Result<PathBuf> {
    print_step("Checking required tools...");

    let client = resolve_program(&config.client.program).ok_or_else(|| {
        MigrationError::ToolMissing {
            tool: config.client.program.clone(),
            hint: "install it, put it on PATH, or set client.program / --client".to_string(),
        }
    })?;
    print_success(&format!("Broker client: {}", client.display()));

    let meta = std::fs::metadata(input)
        .map_err(|e| MigrationError::io(format!("input {}", input.display()), e))?;
    if !meta.is_file() {
        return Err(MigrationError::io(
            format!("input {}", input.display()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    print_success(&format!(
        "Input document: {} ({} bytes)",
        input.display(),
        meta.len()
    ));
    Ok(client)
}
