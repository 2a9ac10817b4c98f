use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::app::error::AppError;
use crate::app::observer::SharedObserver;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const PACKAGE_LIST_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one bridge invocation. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub invocation: Vec<String>,
    pub combined_output: String,
    pub timed_out: bool,
    pub tool_missing: bool,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    pub fn command_line(&self) -> String {
        self.invocation.join(" ")
    }

    /// True when the process ran to completion, regardless of exit code.
    pub fn completed(&self) -> bool {
        !self.timed_out && !self.tool_missing
    }

    /// Converts the timeout and missing-tool flags into errors for callers that
    /// cannot use a partial result.
    pub fn into_completed(self, trace_id: &str) -> Result<Self, AppError> {
        if self.tool_missing {
            return Err(AppError::tool_missing(
                format!(
                    "{} not found on PATH",
                    self.invocation.first().map(String::as_str).unwrap_or("adb")
                ),
                trace_id,
            ));
        }
        if self.timed_out {
            return Err(AppError::timeout(
                format!("Command timed out: {}", self.command_line()),
                trace_id,
            ));
        }
        Ok(self)
    }
}

/// Executes bridge subcommands. `args` excludes the bridge program itself.
pub trait CommandRunner: Send + Sync {
    fn execute(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandResult, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Line-oriented text capture; each line is decoded lossily.
    Text,
    /// Whole-buffer byte capture decoded once at the end.
    Raw,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub output: String,
    pub timed_out: bool,
    pub tool_missing: bool,
    pub exit_code: Option<i32>,
}

/// Runs the real bridge client as a child process.
pub struct ProcessRunner {
    program: String,
    observer: SharedObserver,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, observer: SharedObserver) -> Self {
        Self {
            program: program.into(),
            observer,
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn execute(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        let mut invocation = Vec::with_capacity(args.len() + 1);
        invocation.push(self.program.clone());
        invocation.extend(args.iter().cloned());
        execute_with_fallback(&self.observer, invocation, timeout, trace_id, |mode| {
            capture_process(&self.program, args, timeout, mode)
        })
    }
}

/// Applies the logging and encoding-fallback policy around a capture function.
///
/// Text capture is tried first. A decode error from it triggers exactly one raw
/// re-invocation; if that fails too the error is logged and returned.
pub fn execute_with_fallback(
    observer: &SharedObserver,
    invocation: Vec<String>,
    timeout: Duration,
    trace_id: &str,
    capture: impl Fn(CaptureMode) -> io::Result<Captured>,
) -> Result<CommandResult, AppError> {
    let command_line = invocation.join(" ");
    observer.log_line(&format!("$ {command_line}"));
    debug!(trace_id = %trace_id, command = %command_line, "executing bridge command");

    let captured = match capture(CaptureMode::Text) {
        Ok(captured) => captured,
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            observer.log_line(&format!("Character encoding error: {err}"));
            warn!(trace_id = %trace_id, error = %err, "text capture failed; retrying in raw mode");
            match capture(CaptureMode::Raw) {
                Ok(captured) => captured,
                Err(fallback) => {
                    observer.log_line(&format!("Raw fallback also failed: {fallback}"));
                    return Err(AppError::encoding(
                        format!("Failed to decode output of `{command_line}`: {fallback}"),
                        trace_id,
                    ));
                }
            }
        }
        Err(err) => {
            observer.log_line(&format!("Failed to run command: {err}"));
            return Err(AppError::system(
                format!("Failed to run `{command_line}`: {err}"),
                trace_id,
            ));
        }
    };

    if captured.tool_missing {
        let program = invocation.first().map(String::as_str).unwrap_or("adb");
        observer.log_line(&format!(
            "Error: '{program}' not found. Install Android platform tools and make sure it is on PATH."
        ));
        warn!(trace_id = %trace_id, program = %program, "bridge executable not found");
    } else if captured.timed_out {
        observer.log_line(&format!("Command timed out after {}s.", timeout.as_secs()));
        warn!(trace_id = %trace_id, command = %command_line, "bridge command timed out");
    }

    let output = captured.output.trim_end();
    if !output.is_empty() {
        observer.log_line(output);
    }

    Ok(CommandResult {
        invocation,
        combined_output: captured.output,
        timed_out: captured.timed_out,
        tool_missing: captured.tool_missing,
        exit_code: captured.exit_code,
    })
}

/// Spawns `program args`, drains stdout and stderr in parallel and enforces
/// `timeout`. Output is stdout followed by stderr.
pub fn capture_process(
    program: &str,
    args: &[String],
    timeout: Duration,
    mode: CaptureMode,
) -> io::Result<Captured> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(Captured {
                tool_missing: true,
                ..Captured::default()
            });
        }
        Err(err) => return Err(err),
    };

    // Drain both pipes while waiting; a chatty child blocks once a pipe buffer fills.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stderr"))?;
    let stdout_handle = spawn_drain(stdout, mode);
    let stderr_handle = spawn_drain(stderr, mode);

    let start = Instant::now();
    let (exit_code, timed_out) = loop {
        match child.try_wait() {
            Ok(Some(status)) => break (status.code(), false),
            Ok(None) => {
                if start.elapsed() > timeout {
                    // Best effort: the child may already be gone.
                    let _ = child.kill();
                    let _ = child.wait();
                    break (None, true);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                let _ = join_drain(stdout_handle);
                let _ = join_drain(stderr_handle);
                return Err(err);
            }
        }
    };

    if timed_out {
        // Abandon the readers: a grandchild may still hold the pipes open.
        return Ok(Captured {
            timed_out: true,
            ..Captured::default()
        });
    }

    let mut output = join_drain(stdout_handle)?;
    output.push_str(&join_drain(stderr_handle)?);

    Ok(Captured {
        output,
        timed_out,
        tool_missing: false,
        exit_code,
    })
}

fn spawn_drain<R>(reader: R, mode: CaptureMode) -> JoinHandle<io::Result<String>>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || match mode {
        CaptureMode::Text => drain_text(reader),
        CaptureMode::Raw => drain_raw(reader),
    })
}

fn join_drain(handle: JoinHandle<io::Result<String>>) -> io::Result<String> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader panicked")))
}

/// Reads line by line, replacing invalid UTF-8 with U+FFFD. An `InvalidData`
/// error from the underlying reader is returned as-is so the caller can fall
/// back to raw capture; other read errors end the capture early.
pub fn drain_text<R: Read>(reader: R) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut text = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => text.push_str(&String::from_utf8_lossy(&line)),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => return Err(err),
            Err(_) => break,
        }
    }
    Ok(text)
}

pub fn drain_raw<R: Read>(mut reader: R) -> io::Result<String> {
    let mut buffer = Vec::<u8>::new();
    let mut temp = [0u8; 4096];
    loop {
        match reader.read(&mut temp) {
            Ok(0) => break,
            Ok(count) => buffer.extend_from_slice(&temp[..count]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
