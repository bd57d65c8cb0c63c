//! Path resolution for the external tools (muscle, hmmsearch, the scorer)
//!
//! Search order:
//! 1. An explicit path given on the command line
//! 2. `POLPREDICT_<TOOL>` environment variable (e.g. `POLPREDICT_MUSCLE`)
//! 3. PATH, via `which`

use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable consulted for `tool`
pub fn env_override_name(tool: &str) -> String {
    let sanitized: String = tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("POLPREDICT_{sanitized}")
}

/// Resolve the executable for `tool`, preferring `explicit` when given
pub fn resolve_tool(tool: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        // A bare program name is looked up on PATH below
        if path.components().count() > 1 {
            return Err(anyhow!(
                "{} executable not found at {}",
                tool,
                path.display()
            ));
        }
    }

    let var = env_override_name(tool);
    if let Ok(value) = env::var(&var) {
        let path = PathBuf::from(&value);
        if path.exists() {
            log::debug!("[tools] Using {} from {}: {}", tool, var, path.display());
            return Ok(path);
        }
        log::warn!("[tools] {} points to missing file {}", var, path.display());
    }

    let program = explicit
        .and_then(|p| p.to_str())
        .unwrap_or(tool);

    if let Ok(output) = std::process::Command::new("which").arg(program).output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
    }

    Err(anyhow!(
        "{} executable '{}' not found on PATH.\n\
         Install it, pass its path explicitly, or set {}.",
        tool,
        program,
        var
    ))
}
