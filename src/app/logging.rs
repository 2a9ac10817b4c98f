use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;
use crate::app::observer::{FanoutObserver, LogFileObserver, SharedObserver, TracingObserver};

/// `RUST_LOG` wins over the configured level.
pub fn init_logging(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Tracing always; the plain-text session log only when enabled.
pub fn build_observer(settings: &LoggingSettings) -> SharedObserver {
    let mut fanout = FanoutObserver::new().with(Arc::new(TracingObserver));
    if settings.log_to_file && !settings.log_path.trim().is_empty() {
        fanout = fanout.with(Arc::new(LogFileObserver::new(settings.log_path.trim())));
    }
    Arc::new(fanout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_follows_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.log");
        let settings = LoggingSettings {
            log_level: "debug".to_string(),
            log_to_file: true,
            log_path: path.to_string_lossy().to_string(),
        };
        build_observer(&settings).log_line("$ adb devices");
        let written = std::fs::read_to_string(&path).expect("log file");
        assert!(written.trim_end().ends_with("$ adb devices"));

        let disabled = LoggingSettings {
            log_to_file: false,
            ..settings
        };
        std::fs::remove_file(&path).expect("remove");
        build_observer(&disabled).log_line("$ adb version");
        assert!(!path.exists());
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging("not a level ===");
        init_logging("debug");
    }
}
