use std::path::{Path, PathBuf};

use crate::app::error::AppError;

const SDK_ENV_VARS: [&str; 2] = ["ANDROID_HOME", "ANDROID_SDK_ROOT"];

fn adb_file_name() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn sdk_adb_candidate(sdk_root: &str) -> Option<PathBuf> {
    let root = normalize_command_path(sdk_root);
    if root.is_empty() {
        return None;
    }
    let candidate = Path::new(&root).join("platform-tools").join(adb_file_name());
    candidate.is_file().then_some(candidate)
}

/// Picks the adb program: configured path first, then an SDK install, then `adb` on PATH.
pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    SDK_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find_map(|root| sdk_adb_candidate(&root))
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| "adb".to_string())
}

pub fn validate_adb_program(program: &str, trace_id: &str) -> Result<(), AppError> {
    if program.trim().is_empty() {
        return Err(AppError::dependency("ADB command is empty", trace_id));
    }
    if program == "adb" || program == "adb.exe" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(AppError::dependency(
            "ADB path must point to an executable file",
            trace_id,
        ));
    }
    if !path.exists() {
        return Err(AppError::dependency(
            format!("ADB executable not found at {program}"),
            trace_id,
        ));
    }
    Ok(())
}
