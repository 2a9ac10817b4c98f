use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{info, warn};

use crate::app::adb::intent::{call_args, launch_args, sms_args};
use crate::app::error::AppError;
use crate::app::session::{new_trace_id, Session};

const AM_ERROR_MARKER: &str = "Error";
const MONKEY_SUCCESS_MARKER: &str = "Events injected";
const PUSH_SUCCESS_MARKER: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CallImmediate,
    CallDialer,
    OpenSms,
    LaunchApp,
    Screenshot,
    PushFile,
    PullFile,
}

impl ActionKind {
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::CallImmediate => "call",
            ActionKind::CallDialer => "dial",
            ActionKind::OpenSms => "sms",
            ActionKind::LaunchApp => "launch",
            ActionKind::Screenshot => "screenshot",
            ActionKind::PushFile => "push",
            ActionKind::PullFile => "pull",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub action: ActionKind,
    pub trace_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
}

impl ActionReport {
    fn from_result(action: ActionKind, trace_id: String, result: Result<(), AppError>) -> Self {
        match result {
            Ok(()) => Self {
                action,
                trace_id,
                success: true,
                error: None,
            },
            Err(err) => Self {
                action,
                trace_id,
                success: false,
                error: Some(err),
            },
        }
    }
}

enum HandleState {
    Finished(ActionReport),
    Running(JoinHandle<ActionReport>),
}

/// Completion handle for a dispatched action. Dropping it detaches the action.
pub struct ActionHandle {
    action: ActionKind,
    trace_id: String,
    state: HandleState,
}

impl ActionHandle {
    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Finished(_) => true,
            HandleState::Running(join) => join.is_finished(),
        }
    }

    pub fn join(self) -> ActionReport {
        match self.state {
            HandleState::Finished(report) => report,
            HandleState::Running(join) => join.join().unwrap_or_else(|_| ActionReport {
                action: self.action,
                trace_id: self.trace_id.clone(),
                success: false,
                error: Some(AppError::system("Action thread panicked", &self.trace_id)),
            }),
        }
    }
}

/// Runs device actions on their own threads so callers never wait on the bridge.
pub struct ActionDispatcher {
    session: Arc<Session>,
    screenshot_tmp_path: String,
}

impl ActionDispatcher {
    pub fn new(session: Arc<Session>, screenshot_tmp_path: impl Into<String>) -> Self {
        Self {
            session,
            screenshot_tmp_path: screenshot_tmp_path.into(),
        }
    }

    pub fn call_immediate(&self, number: &str) -> ActionHandle {
        self.dispatch_am(ActionKind::CallImmediate, call_args(number, true))
    }

    pub fn call_dialer(&self, number: &str) -> ActionHandle {
        self.dispatch_am(ActionKind::CallDialer, call_args(number, false))
    }

    pub fn open_sms(&self, number: &str, body: &str) -> ActionHandle {
        self.dispatch_am(ActionKind::OpenSms, sms_args(number, body))
    }

    pub fn launch_app(&self, package: &str) -> ActionHandle {
        let args = launch_args(package);
        self.dispatch(ActionKind::LaunchApp, move |session, trace_id| {
            let result = session.execute_completed(&args, trace_id)?;
            if result.combined_output.contains(MONKEY_SUCCESS_MARKER) {
                Ok(())
            } else {
                Err(AppError::heuristic(
                    format!("monkey did not report '{MONKEY_SUCCESS_MARKER}'"),
                    trace_id,
                ))
            }
        })
    }

    /// Captures on the device, pulls to `local_path`, then removes the device
    /// copy. Only the presence of the local file decides success.
    pub fn screenshot(&self, local_path: impl Into<PathBuf>) -> ActionHandle {
        let local_path = local_path.into();
        let remote = self.screenshot_tmp_path.clone();
        self.dispatch(ActionKind::Screenshot, move |session, trace_id| {
            let local = local_path.to_string_lossy().to_string();
            session.execute_completed(&strings(&["shell", "screencap", "-p", &remote]), trace_id)?;
            session.execute_completed(&strings(&["pull", &remote, &local]), trace_id)?;
            if let Err(err) = session.execute_completed(&strings(&["shell", "rm", &remote]), trace_id) {
                warn!(trace_id = %trace_id, error = %err, "failed to remove device screenshot");
            }
            require_local_file(&local_path, trace_id)
        })
    }

    pub fn push_file(&self, local_path: impl AsRef<Path>, remote_path: &str) -> ActionHandle {
        let args = strings(&[
            "push",
            &local_path.as_ref().to_string_lossy(),
            remote_path,
        ]);
        self.dispatch(ActionKind::PushFile, move |session, trace_id| {
            let result = session.execute_completed(&args, trace_id)?;
            if result.combined_output.contains(PUSH_SUCCESS_MARKER) {
                Ok(())
            } else {
                Err(AppError::heuristic(
                    "push output did not mention a transferred file",
                    trace_id,
                ))
            }
        })
    }

    pub fn pull_file(&self, remote_path: &str, local_path: impl Into<PathBuf>) -> ActionHandle {
        let local_path = local_path.into();
        let args = strings(&["pull", remote_path, &local_path.to_string_lossy()]);
        self.dispatch(ActionKind::PullFile, move |session, trace_id| {
            session.execute_completed(&args, trace_id)?;
            require_local_file(&local_path, trace_id)
        })
    }

    fn dispatch_am(&self, action: ActionKind, args: Vec<String>) -> ActionHandle {
        self.dispatch(action, move |session, trace_id| {
            let result = session.execute_completed(&args, trace_id)?;
            if result.combined_output.contains(AM_ERROR_MARKER) {
                Err(AppError::heuristic(
                    "activity manager reported an error",
                    trace_id,
                ))
            } else {
                Ok(())
            }
        })
    }

    fn dispatch<F>(&self, action: ActionKind, job: F) -> ActionHandle
    where
        F: FnOnce(&Session, &str) -> Result<(), AppError> + Send + 'static,
    {
        let trace_id = new_trace_id();
        if !self.session.is_connected() {
            self.session
                .observer()
                .log_line(&format!("{}: not connected, connect first.", action.label()));
            let report = ActionReport::from_result(
                action,
                trace_id.clone(),
                Err(AppError::not_connected(&trace_id)),
            );
            return ActionHandle {
                action,
                trace_id,
                state: HandleState::Finished(report),
            };
        }

        let session = Arc::clone(&self.session);
        let thread_trace = trace_id.clone();
        let join = thread::spawn(move || {
            let result = job(&session, &thread_trace);
            let report = ActionReport::from_result(action, thread_trace, result);
            match &report.error {
                None => {
                    info!(trace_id = %report.trace_id, action = action.label(), "action succeeded");
                    session.observer().log_line(&format!("{}: ok", action.label()));
                }
                Some(err) => {
                    warn!(trace_id = %report.trace_id, action = action.label(), error = %err, "action failed");
                    session
                        .observer()
                        .log_line(&format!("{}: failed ({})", action.label(), err.error));
                }
            }
            report
        });
        ActionHandle {
            action,
            trace_id,
            state: HandleState::Running(join),
        }
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

fn require_local_file(path: &Path, trace_id: &str) -> Result<(), AppError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AppError::heuristic(
            format!("{} does not exist after transfer", path.display()),
            trace_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::runner::testing::{Scripted, ScriptedRunner};
    use crate::app::error::{ERR_HEURISTIC, ERR_NOT_CONNECTED, ERR_TIMEOUT};
    use crate::app::observer::testing::RecordingObserver;
    use crate::app::session::testing::scripted_session;

    const TMP: &str = "/sdcard/PyPIRT_screenshot.png";

    fn connected() -> (ActionDispatcher, Arc<ScriptedRunner>, Arc<RecordingObserver>) {
        let (session, runner, observer) = scripted_session();
        runner.respond(
            "connect 10.0.0.5:5555",
            Scripted::output("connected to 10.0.0.5:5555"),
        );
        session.connect("10.0.0.5:5555").expect("connected");
        (ActionDispatcher::new(session, TMP), runner, observer)
    }

    fn touch_last_arg() -> Scripted {
        Scripted::Effect(Arc::new(|args: &[String]| {
            let target = args.last().expect("destination");
            std::fs::write(target, b"png").expect("write pulled file");
            format!("{target}: 1 file pulled")
        }))
    }

    #[test]
    fn rejects_when_not_connected() {
        let (session, runner, observer) = scripted_session();
        let dispatcher = ActionDispatcher::new(session, TMP);
        let handle = dispatcher.call_immediate("05551234567");
        assert!(handle.is_finished());
        let report = handle.join();
        assert!(!report.success);
        assert_eq!(report.error.map(|err| err.code), Some(ERR_NOT_CONNECTED.to_string()));
        assert!(runner.calls().is_empty());
        assert!(observer.logs()[0].contains("not connected"));
    }

    #[test]
    fn call_uses_sanitized_tel_uri() {
        let (dispatcher, runner, _) = connected();
        runner.respond(
            "shell am start -a android.intent.action.CALL -d tel:5551234567",
            Scripted::output("Starting: Intent { act=android.intent.action.CALL dat=tel:xxxxxxxxxx }"),
        );
        let report = dispatcher.call_immediate("0555 123 45 67").join();
        assert!(report.success, "{report:?}");
        assert_eq!(report.action, ActionKind::CallImmediate);
    }

    #[test]
    fn am_error_text_is_a_heuristic_failure() {
        let (dispatcher, runner, observer) = connected();
        runner.respond(
            "shell am start -a android.intent.action.DIAL -d tel:+905551234567",
            Scripted::output("Error: Activity not started, unable to resolve Intent"),
        );
        let report = dispatcher.call_dialer("905551234567").join();
        assert!(!report.success);
        assert_eq!(report.error.map(|err| err.code), Some(ERR_HEURISTIC.to_string()));
        assert!(observer.logs().iter().any(|line| line.starts_with("dial: failed")));
    }

    #[test]
    fn sms_passes_body_only_when_present() {
        let (dispatcher, runner, _) = connected();
        assert!(dispatcher.open_sms("905551234567", "").join().success);
        assert!(dispatcher.open_sms("905551234567", "see you").join().success);
        let calls = runner.calls();
        assert!(calls.contains(
            &"shell am start -a android.intent.action.SENDTO -d sms:+905551234567".to_string()
        ));
        assert!(calls.contains(
            &"shell am start -a android.intent.action.SENDTO -d sms:+905551234567 --es sms_body see you"
                .to_string()
        ));
    }

    #[test]
    fn launch_requires_events_injected() {
        let (dispatcher, runner, _) = connected();
        let command = "shell monkey -p com.example -c android.intent.category.LAUNCHER 1";
        runner
            .respond(command, Scripted::output("Events injected: 1\n"))
            .respond(command, Scripted::output("** No activities found to run, monkey aborted.\n"));
        assert!(dispatcher.launch_app("com.example").join().success);
        let report = dispatcher.launch_app("com.example").join();
        assert_eq!(report.error.map(|err| err.code), Some(ERR_HEURISTIC.to_string()));
    }

    #[test]
    fn screenshot_succeeds_when_local_file_exists_even_if_cleanup_fails() {
        let (dispatcher, runner, _) = connected();
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("shot.png");
        let local_str = local.to_string_lossy().to_string();
        runner
            .respond(&format!("pull {TMP} {local_str}"), touch_last_arg())
            .respond(&format!("shell rm {TMP}"), Scripted::TimedOut);

        let report = dispatcher.screenshot(&local).join();
        assert!(report.success, "{report:?}");
        let calls = runner.calls();
        let tail: Vec<&str> = calls.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                format!("shell screencap -p {TMP}").as_str(),
                format!("pull {TMP} {local_str}").as_str(),
                format!("shell rm {TMP}").as_str(),
            ]
        );
    }

    #[test]
    fn screenshot_without_local_file_fails() {
        let (dispatcher, _, _) = connected();
        let dir = tempfile::tempdir().expect("tempdir");
        let report = dispatcher.screenshot(dir.path().join("missing.png")).join();
        assert_eq!(report.error.map(|err| err.code), Some(ERR_HEURISTIC.to_string()));
    }

    #[test]
    fn screenshot_capture_timeout_fails() {
        let (dispatcher, runner, _) = connected();
        runner.respond(&format!("shell screencap -p {TMP}"), Scripted::TimedOut);
        let dir = tempfile::tempdir().expect("tempdir");
        let report = dispatcher.screenshot(dir.path().join("shot.png")).join();
        assert_eq!(report.error.map(|err| err.code), Some(ERR_TIMEOUT.to_string()));
    }

    #[test]
    fn push_requires_file_word() {
        let (dispatcher, runner, _) = connected();
        runner
            .respond(
                "push notes.txt /sdcard/notes.txt",
                Scripted::output("notes.txt: 1 file pushed, 0 skipped. 0.3 MB/s"),
            )
            .respond(
                "push missing.txt /sdcard/missing.txt",
                Scripted::output("adb: error: cannot stat 'missing.txt': No such directory"),
            );
        assert!(dispatcher.push_file("notes.txt", "/sdcard/notes.txt").join().success);
        assert!(!dispatcher.push_file("missing.txt", "/sdcard/missing.txt").join().success);
    }

    #[test]
    fn pull_checks_destination() {
        let (dispatcher, runner, _) = connected();
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("notes.txt");
        runner.respond(
            &format!("pull /sdcard/notes.txt {}", local.to_string_lossy()),
            touch_last_arg(),
        );
        assert!(dispatcher.pull_file("/sdcard/notes.txt", &local).join().success);
        assert!(!dispatcher
            .pull_file("/sdcard/absent.txt", dir.path().join("absent.txt"))
            .join()
            .success);
    }

    #[test]
    fn actions_run_concurrently() {
        let (dispatcher, _, _) = connected();
        let handles: Vec<ActionHandle> = (0..5)
            .map(|index| dispatcher.launch_app(&format!("com.example.app{index}")))
            .collect();
        let trace_ids: std::collections::HashSet<String> =
            handles.iter().map(|handle| handle.trace_id().to_string()).collect();
        assert_eq!(trace_ids.len(), 5);
        for handle in handles {
            assert_eq!(handle.action(), ActionKind::LaunchApp);
            let report = handle.join();
            assert!(!report.success);
        }
    }
}
