use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::{info, warn};

/// Narrow sink through which the core reports to whatever sits in front of it.
///
/// `log_line` receives every executed command line (prefixed with `$ `) and every
/// non-empty captured output. `status_changed` fires whenever connectivity is
/// confirmed or lost.
pub trait SessionObserver: Send + Sync {
    fn log_line(&self, line: &str);
    fn status_changed(&self, connected: bool, model: Option<&str>);
}

pub type SharedObserver = Arc<dyn SessionObserver>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn log_line(&self, _line: &str) {}
    fn status_changed(&self, _connected: bool, _model: Option<&str>) {}
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn log_line(&self, line: &str) {
        info!(target: "pirt::bridge", "{line}");
    }

    fn status_changed(&self, connected: bool, model: Option<&str>) {
        info!(
            target: "pirt::status",
            connected,
            model = model.unwrap_or(""),
            "device status changed"
        );
    }
}

/// Appends `[YYYY-mm-dd HH:MM:SS] line` records to a plain-text log file.
/// The file is opened on the first record and kept open; a failed write drops
/// the handle so the next record reopens it.
pub struct LogFileObserver {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFileObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    fn append(&self, line: &str) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "failed to open log file");
                    return;
                }
            }
        }
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Some(file) = guard.as_mut() {
            if let Err(err) = writeln!(file, "[{stamp}] {line}") {
                warn!(path = %self.path.display(), error = %err, "failed to append log file");
                *guard = None;
            }
        }
    }
}

impl SessionObserver for LogFileObserver {
    fn log_line(&self, line: &str) {
        self.append(line);
    }

    fn status_changed(&self, connected: bool, model: Option<&str>) {
        let line = match (connected, model) {
            (true, Some(model)) => format!("status: connected ({model})"),
            (true, None) => "status: connected".to_string(),
            (false, _) => "status: disconnected".to_string(),
        };
        self.append(&line);
    }
}

/// Fans every event out to several observers in registration order.
#[derive(Default)]
pub struct FanoutObserver {
    observers: Vec<SharedObserver>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: SharedObserver) -> Self {
        self.observers.push(observer);
        self
    }
}

impl SessionObserver for FanoutObserver {
    fn log_line(&self, line: &str) {
        for observer in &self.observers {
            observer.log_line(line);
        }
    }

    fn status_changed(&self, connected: bool, model: Option<&str>) {
        for observer in &self.observers {
            observer.status_changed(connected, model);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ObservedEvent {
        Log(String),
        Status(bool, Option<String>),
    }

    /// Records every callback for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<ObservedEvent>>,
    }

    impl RecordingObserver {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn events(&self) -> Vec<ObservedEvent> {
            self.events.lock().expect("events lock").clone()
        }

        pub fn logs(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    ObservedEvent::Log(line) => Some(line),
                    ObservedEvent::Status(..) => None,
                })
                .collect()
        }

        pub fn statuses(&self) -> Vec<(bool, Option<String>)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    ObservedEvent::Status(connected, model) => Some((connected, model)),
                    ObservedEvent::Log(_) => None,
                })
                .collect()
        }
    }

    impl SessionObserver for RecordingObserver {
        fn log_line(&self, line: &str) {
            self.events
                .lock()
                .expect("events lock")
                .push(ObservedEvent::Log(line.to_string()));
        }

        fn status_changed(&self, connected: bool, model: Option<&str>) {
            self.events
                .lock()
                .expect("events lock")
                .push(ObservedEvent::Status(connected, model.map(str::to_string)));
        }
    }
}
