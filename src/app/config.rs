use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::adb::runner::{DEFAULT_TIMEOUT, PACKAGE_LIST_TIMEOUT};
use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "PIRT_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbSettings {
    /// Empty means `adb` from `PATH`.
    pub command_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    pub default_timeout_secs: u64,
    pub package_list_timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            package_list_timeout_secs: PACKAGE_LIST_TIMEOUT.as_secs(),
        }
    }
}

impl CommandSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn package_list_timeout(&self) -> Duration {
        Duration::from_secs(self.package_list_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenshotSettings {
    pub remote_tmp_path: String,
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            remote_tmp_path: "/sdcard/PyPIRT_screenshot.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
            log_path: "PyPIRT.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub screenshot: ScreenshotSettings,
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
        .join(".pirt_config.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = AppConfig::default();
    if config.command.default_timeout_secs == 0 {
        config.command.default_timeout_secs = defaults.command.default_timeout_secs;
    }
    if config.command.package_list_timeout_secs == 0 {
        config.command.package_list_timeout_secs = defaults.command.package_list_timeout_secs;
    }
    if config.poller.interval_secs == 0 {
        config.poller.interval_secs = defaults.poller.interval_secs;
    }
    if config.screenshot.remote_tmp_path.trim().is_empty() {
        config.screenshot.remote_tmp_path = defaults.screenshot.remote_tmp_path;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = defaults.logging.log_level;
    }
    if config.logging.log_path.trim().is_empty() {
        config.logging.log_to_file = false;
    }
    config
}
