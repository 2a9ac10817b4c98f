use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use pirt_remote_lib::app::adb::apps::filter_packages;
use pirt_remote_lib::app::adb::locator::{check_adb, resolve_adb_program};
use pirt_remote_lib::app::adb::runner::ProcessRunner;
use pirt_remote_lib::app::config::{config_path, load_config_from_path, AppConfig};
use pirt_remote_lib::app::dispatcher::{ActionDispatcher, ActionHandle};
use pirt_remote_lib::app::error::AppError;
use pirt_remote_lib::app::logging::{build_observer, init_logging};
use pirt_remote_lib::app::observer::{FanoutObserver, SessionObserver, SharedObserver};
use pirt_remote_lib::app::poller::start_status_poller;
use pirt_remote_lib::app::session::{new_trace_id, Session};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

const WATCH_RECV_SLICE: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "pirt")]
#[command(about = "Remote control for an Android device over adb")]
#[command(version)]
struct Cli {
    /// Connect to this host:port before running the command
    #[arg(long, global = true, value_name = "HOST:PORT")]
    target: Option<String>,

    /// Config file (defaults to $PIRT_CONFIG_PATH or ~/.pirt_config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that adb is installed and runnable
    Check,
    /// Connect to a device over TCP/IP
    Connect { endpoint: String },
    /// Drop the TCP/IP connection
    Disconnect,
    /// List devices in the `device` state
    Devices,
    /// Model, brand, Android version and battery
    Info,
    /// Place a call, or open the dialer with --dialer
    Call {
        number: String,
        #[arg(long)]
        dialer: bool,
    },
    /// Open the SMS composer
    Sms {
        number: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// List installed packages
    Apps {
        /// Include system packages
        #[arg(long)]
        system: bool,
        /// Case-insensitive match on package id or name
        #[arg(long)]
        filter: Option<String>,
    },
    /// Version, target SDK and APK path of a package
    AppInfo { package: String },
    /// Launch a package's launcher activity
    Launch { package: String },
    /// Capture the screen into a local PNG
    Screenshot { local: PathBuf },
    /// Copy a local file to the device
    Push { local: PathBuf, remote: String },
    /// Copy a device file to the local machine
    Pull { remote: String, local: PathBuf },
    /// Poll device presence and print status changes
    Watch {
        /// Stop after this many poll cycles; connect reports do not count
        #[arg(long)]
        cycles: Option<u32>,
    },
}

/// Forwards status changes to the `watch` loop.
struct StatusChannel {
    sender: Mutex<Sender<(bool, Option<String>)>>,
}

impl SessionObserver for StatusChannel {
    fn log_line(&self, _line: &str) {}

    fn status_changed(&self, connected: bool, model: Option<&str>) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send((connected, model.map(str::to_string)));
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let trace_id = new_trace_id();
    let path = cli.config.clone().unwrap_or_else(config_path);
    let config = match load_config_from_path(&path, &trace_id) {
        Ok(config) => config,
        Err(err) => return report_error(cli.json, &err),
    };
    init_logging(&config.logging.log_level);

    let mut observer = build_observer(&config.logging);
    let mut status_rx = None;
    if matches!(cli.command, Commands::Watch { .. }) {
        let (sender, receiver) = mpsc::channel();
        let channel: SharedObserver = Arc::new(StatusChannel {
            sender: Mutex::new(sender),
        });
        observer = Arc::new(FanoutObserver::new().with(observer).with(channel));
        status_rx = Some(receiver);
    }

    let program = resolve_adb_program(&config.adb.command_path);
    let runner = Arc::new(ProcessRunner::new(program.clone(), Arc::clone(&observer)));
    let session = Arc::new(Session::new(
        runner.clone(),
        observer,
        config.command.clone(),
    ));

    let app = App {
        json: cli.json,
        target: cli.target.clone(),
        config,
        session,
    };
    let result = match cli.command {
        Commands::Check => {
            let info = check_adb(runner.as_ref(), &program, &trace_id);
            app.print(&info, || match &info.error {
                None => info.version_output.clone(),
                Some(error) => format!("adb unavailable at {}: {error}", info.command_path),
            });
            if info.available {
                Ok(())
            } else {
                Err(AppError::tool_missing(
                    info.error.clone().unwrap_or_else(|| "adb unavailable".to_string()),
                    &trace_id,
                ))
            }
        }
        Commands::Watch { cycles } => match status_rx {
            Some(receiver) => app.watch(receiver, cycles, &trace_id),
            None => Err(AppError::system("status channel missing", &trace_id)),
        },
        command => app.run(command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(app.json, &err),
    }
}

fn report_error(json: bool, err: &AppError) -> ExitCode {
    if json {
        eprintln!("{}", json!({ "error": err }));
    } else {
        eprintln!("error: {err}");
    }
    ExitCode::FAILURE
}

struct App {
    json: bool,
    target: Option<String>,
    config: AppConfig,
    session: Arc<Session>,
}

impl App {
    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(raw) => println!("{raw}"),
                Err(err) => eprintln!("failed to serialize output: {err}"),
            }
        } else {
            println!("{}", text());
        }
    }

    /// Connects to `--target` when given, otherwise probes so the session
    /// reflects whatever device is already attached.
    fn ensure_ready(&self) -> Result<(), AppError> {
        match self.target.as_deref() {
            Some(target) => {
                self.session.connect(target)?;
            }
            None => {
                self.session.probe()?;
            }
        }
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(AppError::not_connected(new_trace_id()))
        }
    }

    fn dispatcher(&self) -> ActionDispatcher {
        ActionDispatcher::new(
            Arc::clone(&self.session),
            self.config.screenshot.remote_tmp_path.clone(),
        )
    }

    fn finish(&self, handle: ActionHandle) -> Result<(), AppError> {
        let report = handle.join();
        self.print(&report, || {
            format!(
                "{}: {}",
                report.action.label(),
                if report.success { "ok" } else { "failed" }
            )
        });
        match report.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run(&self, command: Commands) -> Result<(), AppError> {
        match command {
            Commands::Connect { endpoint } => {
                let snapshot = self.session.connect(&endpoint)?;
                self.print(&*snapshot, || match &snapshot.model {
                    Some(model) => format!("connected to {endpoint} ({model})"),
                    None => format!("connected to {endpoint}"),
                });
                Ok(())
            }
            Commands::Disconnect => {
                if let Some(target) = self.target.as_deref() {
                    self.session.connect(target)?;
                }
                self.session.disconnect()?;
                self.print(&json!({ "connected": false }), || "disconnected".to_string());
                Ok(())
            }
            Commands::Devices => {
                if let Some(target) = self.target.as_deref() {
                    self.session.connect(target)?;
                }
                let devices = self.session.enumerate()?;
                self.print(&devices, || {
                    if devices.is_empty() {
                        "no devices".to_string()
                    } else {
                        devices.join("\n")
                    }
                });
                Ok(())
            }
            Commands::Info => {
                self.ensure_ready()?;
                let info = self.session.device_info();
                self.print(&info, || {
                    info.fields
                        .iter()
                        .map(|(field, value)| format!("{field}: {value}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                Ok(())
            }
            Commands::Apps { system, filter } => {
                self.ensure_ready()?;
                let packages = self.session.list_packages(system);
                let hits = filter_packages(&packages, filter.as_deref().unwrap_or(""));
                self.print(&hits, || {
                    hits.iter()
                        .map(|record| format!("{}\t{}", record.display_name, record.package_id))
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                Ok(())
            }
            Commands::AppInfo { package } => {
                self.ensure_ready()?;
                let info = self.session.app_info(&package);
                let apk_path = self.session.apk_path(&package);
                let value = json!({ "info": info, "apk_path": apk_path });
                self.print(&value, || {
                    format!(
                        "package: {}\nversion: {}\ntarget sdk: {}\napk: {}",
                        info.package,
                        info.version.as_deref().unwrap_or("-"),
                        info.target_sdk.as_deref().unwrap_or("-"),
                        apk_path.as_deref().unwrap_or("-"),
                    )
                });
                Ok(())
            }
            Commands::Call { number, dialer } => {
                self.ensure_ready()?;
                let dispatcher = self.dispatcher();
                let handle = if dialer {
                    dispatcher.call_dialer(&number)
                } else {
                    dispatcher.call_immediate(&number)
                };
                self.finish(handle)
            }
            Commands::Sms { number, body } => {
                self.ensure_ready()?;
                self.finish(self.dispatcher().open_sms(&number, &body))
            }
            Commands::Launch { package } => {
                self.ensure_ready()?;
                self.finish(self.dispatcher().launch_app(&package))
            }
            Commands::Screenshot { local } => {
                self.ensure_ready()?;
                self.finish(self.dispatcher().screenshot(local))
            }
            Commands::Push { local, remote } => {
                self.ensure_ready()?;
                self.finish(self.dispatcher().push_file(&local, &remote))
            }
            Commands::Pull { remote, local } => {
                self.ensure_ready()?;
                self.finish(self.dispatcher().pull_file(&remote, local))
            }
            Commands::Check | Commands::Watch { .. } => Ok(()),
        }
    }

    fn watch(
        &self,
        receiver: Receiver<(bool, Option<String>)>,
        cycles: Option<u32>,
        trace_id: &str,
    ) -> Result<(), AppError> {
        if !self.config.poller.enabled {
            return Err(AppError::validation(
                "status poller is disabled in the config",
                trace_id,
            ));
        }
        match self.session.version() {
            Ok(line) => info!(trace_id = %trace_id, version = %line, "bridge ready"),
            Err(err) => warn!(trace_id = %trace_id, error = %err, "bridge version unavailable"),
        }
        if let Some(target) = self.target.as_deref() {
            // A refused connect still leaves the poller to discover devices.
            drop(self.session.spawn_connect(target));
        }
        let interval = Duration::from_secs(self.config.poller.interval_secs);
        let handle = start_status_poller(Arc::clone(&self.session), interval);

        let mut last: Option<(bool, Option<String>)> = None;
        loop {
            match receiver.recv_timeout(WATCH_RECV_SLICE) {
                Ok(status) => self.print_status_change(&mut last, status),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if cycles.is_some_and(|limit| handle.cycles() >= u64::from(limit)) {
                // The last cycle's report is already queued.
                for status in receiver.try_iter() {
                    self.print_status_change(&mut last, status);
                }
                break;
            }
        }
        handle.stop();
        Ok(())
    }

    fn print_status_change(
        &self,
        last: &mut Option<(bool, Option<String>)>,
        status: (bool, Option<String>),
    ) {
        if last.as_ref() == Some(&status) {
            return;
        }
        let (connected, model) = &status;
        self.print(&json!({ "connected": connected, "model": model }), || {
            match (connected, model) {
                (true, Some(model)) => format!("connected ({model})"),
                (true, None) => "connected".to_string(),
                (false, _) => "disconnected".to_string(),
            }
        });
        *last = Some(status);
    }
}
