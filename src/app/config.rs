use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "ADB_UI_QUERY_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbSettings {
    pub command_path: String,
    pub command_timeout_sec: u64,
    pub server_host: String,
    pub server_port: Option<u16>,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_sec: 30,
            server_host: String::new(),
            server_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InteractionSettings {
    pub scroll_max_iterations: u32,
    pub scroll_settle_ms: u64,
    pub swipe_duration_ms: u32,
    pub scroll_start_ratio: f64,
    pub scroll_end_ratio: f64,
    pub long_press_ms: u32,
    pub double_tap_interval_ms: u64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            scroll_max_iterations: 10,
            scroll_settle_ms: 500,
            swipe_duration_ms: 300,
            scroll_start_ratio: 0.7,
            scroll_end_ratio: 0.3,
            long_press_ms: 1000,
            double_tap_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub max_parallel_devices: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_parallel_devices: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub interaction: InteractionSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".adb_ui_query_config.json")
}

fn backup_path_for(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    let path = config_path();
    save_config_to_path(config, &path, &backup_path_for(&path), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

fn valid_ratio(value: f64) -> bool {
    value.is_finite() && (0.05..=0.95).contains(&value)
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    let adb_defaults = AdbSettings::default();
    let interaction_defaults = InteractionSettings::default();

    if !(1..=600).contains(&config.adb.command_timeout_sec) {
        config.adb.command_timeout_sec = adb_defaults.command_timeout_sec;
    }
    if config.adb.server_port == Some(0) {
        config.adb.server_port = None;
    }

    let interaction = &mut config.interaction;
    if !(1..=100).contains(&interaction.scroll_max_iterations) {
        interaction.scroll_max_iterations = interaction_defaults.scroll_max_iterations;
    }
    if interaction.scroll_settle_ms > 10_000 {
        interaction.scroll_settle_ms = interaction_defaults.scroll_settle_ms;
    }
    if !(1..=10_000).contains(&interaction.swipe_duration_ms) {
        interaction.swipe_duration_ms = interaction_defaults.swipe_duration_ms;
    }
    if !valid_ratio(interaction.scroll_start_ratio)
        || !valid_ratio(interaction.scroll_end_ratio)
        || interaction.scroll_start_ratio == interaction.scroll_end_ratio
    {
        interaction.scroll_start_ratio = interaction_defaults.scroll_start_ratio;
        interaction.scroll_end_ratio = interaction_defaults.scroll_end_ratio;
    }
    if !(1..=60_000).contains(&interaction.long_press_ms) {
        interaction.long_press_ms = interaction_defaults.long_press_ms;
    }
    if interaction.double_tap_interval_ms > 2_000 {
        interaction.double_tap_interval_ms = interaction_defaults.double_tap_interval_ms;
    }

    if config.scheduler.max_parallel_devices == 0 {
        config.scheduler.max_parallel_devices = SchedulerSettings::default().max_parallel_devices;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = LoggingSettings::default().log_level;
    }
    config
}
