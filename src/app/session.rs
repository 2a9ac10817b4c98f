use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::apps::{parse_app_info, parse_pm_list_packages_output, parse_pm_path_output};
use crate::app::adb::parse::{parse_battery, parse_getprop_value, parse_ready_serials, parse_version_line};
use crate::app::adb::runner::{CommandResult, CommandRunner};
use crate::app::config::CommandSettings;
use crate::app::error::AppError;
use crate::app::models::{
    AppInfo, DeviceInfo, PackageRecord, INFO_ANDROID_VERSION, INFO_BATTERY, INFO_BATTERY_LEVEL,
    INFO_BRAND, INFO_MODEL, INFO_UNKNOWN,
};
use crate::app::observer::SharedObserver;

pub const PROP_MODEL: &str = "ro.product.model";
pub const PROP_BRAND: &str = "ro.product.brand";
pub const PROP_ANDROID_VERSION: &str = "ro.build.version.release";

const CONNECT_MARKERS: [&str; 2] = ["connected to", "already connected to"];

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Immutable view of the session. Every change publishes a new snapshot with a
/// higher `generation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub endpoint: Option<String>,
    pub state: ConnectionState,
    pub model: Option<String>,
    pub generation: u64,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            endpoint: None,
            state: ConnectionState::Disconnected,
            model: None,
            generation: 0,
        }
    }
}

/// Holds the current snapshot. Writers do not coordinate with each other:
/// concurrent connect, disconnect and poll results simply replace one another
/// and the last write wins.
#[derive(Debug, Default)]
pub struct SessionCell {
    current: RwLock<Arc<SessionSnapshot>>,
}

impl SessionCell {
    pub fn load(&self) -> Arc<SessionSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Publishes a snapshot derived from the current one.
    pub fn publish(
        &self,
        build: impl FnOnce(&SessionSnapshot) -> SessionSnapshot,
    ) -> Arc<SessionSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = build(&guard);
        next.generation = guard.generation + 1;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub devices: Vec<String>,
    pub model: Option<String>,
}

/// The one live connection to the bridge for this process.
pub struct Session {
    runner: Arc<dyn CommandRunner>,
    observer: SharedObserver,
    settings: CommandSettings,
    cell: SessionCell,
}

impl Session {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        observer: SharedObserver,
        settings: CommandSettings,
    ) -> Self {
        Self {
            runner,
            observer,
            settings,
            cell: SessionCell::default(),
        }
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.cell.load()
    }

    pub fn is_connected(&self) -> bool {
        self.cell.load().is_connected()
    }

    pub fn observer(&self) -> &SharedObserver {
        &self.observer
    }

    pub fn execute(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        self.runner.execute(args, timeout, trace_id)
    }

    /// Runs with the default timeout and turns timeouts and a missing tool into errors.
    pub fn execute_completed(
        &self,
        args: &[String],
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        self.execute(args, self.settings.default_timeout(), trace_id)?
            .into_completed(trace_id)
    }

    fn mark_disconnected(&self) -> Arc<SessionSnapshot> {
        self.cell.publish(|prev| SessionSnapshot {
            endpoint: prev.endpoint.clone(),
            state: ConnectionState::Disconnected,
            model: None,
            generation: prev.generation,
        })
    }

    fn mark_connected(&self, model: Option<String>) -> Arc<SessionSnapshot> {
        self.cell.publish(|prev| SessionSnapshot {
            endpoint: prev.endpoint.clone(),
            state: ConnectionState::Connected,
            model,
            generation: prev.generation,
        })
    }

    /// Records a lost connection and tells the observer.
    pub fn report_disconnected(&self) {
        self.mark_disconnected();
        self.observer.status_changed(false, None);
    }

    pub fn version(&self) -> Result<String, AppError> {
        let trace_id = new_trace_id();
        let result = self.execute_completed(&args(&["version"]), &trace_id)?;
        parse_version_line(&result.combined_output)
            .ok_or_else(|| AppError::system("adb version produced no output", &trace_id))
    }

    pub fn connect(&self, endpoint: &str) -> Result<Arc<SessionSnapshot>, AppError> {
        let trace_id = new_trace_id();
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            self.observer.log_line("Endpoint (host:port) must not be empty.");
            return Err(AppError::validation("endpoint is required", &trace_id));
        }

        info!(trace_id = %trace_id, endpoint = %endpoint, "connecting");
        self.cell.publish(|prev| SessionSnapshot {
            endpoint: Some(endpoint.clone()),
            state: ConnectionState::Connecting,
            model: None,
            generation: prev.generation,
        });

        let outcome = self
            .execute_completed(&args(&["connect", &endpoint]), &trace_id)
            .and_then(|result| {
                let output = &result.combined_output;
                if CONNECT_MARKERS.iter().any(|marker| output.contains(marker)) {
                    Ok(())
                } else {
                    Err(AppError::connect(
                        format!("adb connect {endpoint} failed: {}", output.trim()),
                        &trace_id,
                    ))
                }
            });

        match outcome {
            Ok(()) => {
                let model = self.device_model();
                let snapshot = self.cell.publish(|prev| SessionSnapshot {
                    endpoint: Some(endpoint.clone()),
                    state: ConnectionState::Connected,
                    model: model.clone(),
                    generation: prev.generation,
                });
                self.observer.status_changed(true, model.as_deref());
                Ok(snapshot)
            }
            Err(err) => {
                warn!(trace_id = %trace_id, endpoint = %endpoint, error = %err, "connect failed");
                self.cell.publish(|prev| SessionSnapshot {
                    endpoint: None,
                    state: ConnectionState::Disconnected,
                    model: None,
                    generation: prev.generation,
                });
                self.observer.status_changed(false, None);
                Err(err)
            }
        }
    }

    /// Runs `connect` on its own thread so the caller is not blocked.
    pub fn spawn_connect(
        self: &Arc<Self>,
        endpoint: impl Into<String>,
    ) -> JoinHandle<Result<Arc<SessionSnapshot>, AppError>> {
        let session = Arc::clone(self);
        let endpoint = endpoint.into();
        thread::spawn(move || session.connect(&endpoint))
    }

    /// Always ends `Disconnected`, even if the bridge call fails.
    pub fn disconnect(&self) -> Result<(), AppError> {
        let trace_id = new_trace_id();
        let endpoint = self.cell.load().endpoint.clone();
        let command = match endpoint.as_deref() {
            Some(endpoint) => args(&["disconnect", endpoint]),
            None => args(&["disconnect"]),
        };
        let result = self.execute_completed(&command, &trace_id).map(|_| ());
        if let Err(err) = &result {
            warn!(trace_id = %trace_id, error = %err, "disconnect command failed");
        }
        self.report_disconnected();
        result
    }

    pub fn getprop(&self, key: &str, trace_id: &str) -> Result<Option<String>, AppError> {
        let result = self.execute_completed(&args(&["shell", "getprop", key]), trace_id)?;
        Ok(parse_getprop_value(&result.combined_output))
    }

    /// Best effort; any failure reads as "no model".
    pub fn device_model(&self) -> Option<String> {
        let trace_id = new_trace_id();
        match self.getprop(PROP_MODEL, &trace_id) {
            Ok(model) => model,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "model query failed");
                None
            }
        }
    }

    /// Serials in the `device` state. An empty list is a valid answer and marks
    /// the session disconnected.
    pub fn enumerate(&self) -> Result<Vec<String>, AppError> {
        let trace_id = new_trace_id();
        let result = self.execute_completed(&args(&["devices"]), &trace_id)?;
        let devices = parse_ready_serials(&result.combined_output);
        if devices.is_empty() {
            self.mark_disconnected();
        }
        Ok(devices)
    }

    /// Enumerates, refreshes the model when a device is present, publishes the
    /// result and reports it to the observer.
    pub fn probe(&self) -> Result<Probe, AppError> {
        let devices = self.enumerate()?;
        if devices.is_empty() {
            self.observer.status_changed(false, None);
            return Ok(Probe {
                devices,
                model: None,
            });
        }
        let model = self.device_model();
        self.mark_connected(model.clone());
        self.observer.status_changed(true, model.as_deref());
        Ok(Probe { devices, model })
    }

    /// Each field is queried on its own; a failing query stores `unknown` for
    /// that field only.
    pub fn device_info(&self) -> DeviceInfo {
        let trace_id = new_trace_id();
        let mut info = DeviceInfo::default();
        for (field, key) in [
            (INFO_MODEL, PROP_MODEL),
            (INFO_BRAND, PROP_BRAND),
            (INFO_ANDROID_VERSION, PROP_ANDROID_VERSION),
        ] {
            let value = match self.getprop(key, &trace_id) {
                Ok(Some(value)) => value,
                Ok(None) => INFO_UNKNOWN.to_string(),
                Err(err) => {
                    warn!(trace_id = %trace_id, field = %field, error = %err, "device info query failed");
                    INFO_UNKNOWN.to_string()
                }
            };
            info.insert(field, value);
        }

        match self.execute_completed(&args(&["shell", "dumpsys", "battery"]), &trace_id) {
            Ok(result) => {
                let battery = parse_battery(&result.combined_output);
                if let Some(level) = battery.level {
                    info.insert(INFO_BATTERY_LEVEL, level.to_string());
                }
                info.insert(INFO_BATTERY, battery.blob);
            }
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "battery query failed");
                info.insert(INFO_BATTERY, INFO_UNKNOWN);
            }
        }
        info
    }

    /// Recomputed from scratch on every call. Failures produce an empty list.
    pub fn list_packages(&self, include_system: bool) -> Vec<PackageRecord> {
        let trace_id = new_trace_id();
        let mut command = args(&["shell", "pm", "list", "packages"]);
        if !include_system {
            command.push("-3".to_string());
        }
        let result = self
            .execute(&command, self.settings.package_list_timeout(), &trace_id)
            .and_then(|result| result.into_completed(&trace_id));
        match result {
            Ok(result) => {
                let packages = parse_pm_list_packages_output(&result.combined_output);
                info!(trace_id = %trace_id, count = packages.len(), "package list received");
                packages
            }
            Err(err) => {
                self.observer
                    .log_line(&format!("Package list failed: {}", err.error));
                warn!(trace_id = %trace_id, error = %err, "package list failed");
                Vec::new()
            }
        }
    }

    pub fn app_info(&self, package: &str) -> AppInfo {
        let trace_id = new_trace_id();
        match self.execute_completed(&args(&["shell", "dumpsys", "package", package]), &trace_id) {
            Ok(result) => parse_app_info(package, &result.combined_output),
            Err(err) => {
                warn!(trace_id = %trace_id, package = %package, error = %err, "app info failed");
                parse_app_info(package, "")
            }
        }
    }

    pub fn apk_path(&self, package: &str) -> Option<String> {
        let trace_id = new_trace_id();
        match self.execute_completed(&args(&["shell", "pm", "path", package]), &trace_id) {
            Ok(result) => parse_pm_path_output(&result.combined_output),
            Err(err) => {
                warn!(trace_id = %trace_id, package = %package, error = %err, "pm path failed");
                None
            }
        }
    }
}
