use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::adb::parse::parse_version_line;
use crate::app::adb::runner::CommandRunner;

pub const DEFAULT_ADB_PROGRAM: &str = "adb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdbInfo {
    pub available: bool,
    pub version_output: String,
    pub command_path: String,
    pub error: Option<String>,
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        DEFAULT_ADB_PROGRAM.to_string()
    } else {
        normalized
    }
}

/// Finds the executable the way process spawning will: bare names go through
/// `PATH`, anything else must exist as a file.
pub fn locate_adb_program(program: &str) -> Result<PathBuf, String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    let path = Path::new(program);
    if path.components().count() == 1 {
        return which::which(program)
            .map_err(|_| format!("'{program}' was not found on PATH"));
    }
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(path.to_path_buf())
}

/// Runs `adb version` and reports whether the bridge client is usable.
pub fn check_adb(runner: &dyn CommandRunner, program: &str, trace_id: &str) -> AdbInfo {
    if let Err(message) = locate_adb_program(program) {
        warn!(trace_id = %trace_id, error = %message, "adb validation failed");
        return AdbInfo {
            available: false,
            version_output: String::new(),
            command_path: program.to_string(),
            error: Some(message),
        };
    }

    let args = vec!["version".to_string()];
    let result = match runner
        .execute(&args, Duration::from_secs(5), trace_id)
        .and_then(|result| result.into_completed(trace_id))
    {
        Ok(result) => result,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err.error, "adb check failed");
            return AdbInfo {
                available: false,
                version_output: String::new(),
                command_path: program.to_string(),
                error: Some(err.error),
            };
        }
    };

    let available = result.exit_code.unwrap_or_default() == 0;
    let version_output = result.combined_output.trim().to_string();
    if let Some(line) = parse_version_line(&version_output) {
        info!(trace_id = %trace_id, version = %line, "adb available");
    }
    AdbInfo {
        available,
        error: if available {
            None
        } else {
            Some("ADB command returned a non-zero exit code".to_string())
        },
        version_output,
        command_path: program.to_string(),
    }
}
