use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::session::Session;

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

pub struct StatusPollerHandle {
    stop_flag: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    join: JoinHandle<()>,
}

impl StatusPollerHandle {
    /// Completed poll cycles. A cycle's status report is delivered before the
    /// count moves.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stops the loop and waits for the in-flight probe, if any, to finish.
    pub fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }
}

/// Re-probes the device every `interval` for as long as the handle lives.
/// Probe errors mark the session disconnected and the loop keeps going.
pub fn start_status_poller(session: Arc<Session>, interval: Duration) -> StatusPollerHandle {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_thread = Arc::clone(&stop_flag);
    let cycles = Arc::new(AtomicU64::new(0));
    let cycles_thread = Arc::clone(&cycles);

    let join = thread::spawn(move || {
        while sleep_with_stop(interval, &stop_thread) {
            match session.probe() {
                Ok(probe) => {
                    debug!(devices = probe.devices.len(), "status poll");
                }
                Err(err) => {
                    warn!(trace_id = %err.trace_id, error = %err, "status poll failed");
                    session.report_disconnected();
                }
            }
            cycles_thread.fetch_add(1, Ordering::Release);
        }
    });

    StatusPollerHandle {
        stop_flag,
        cycles,
        join,
    }
}

/// Returns false once the stop flag is raised.
fn sleep_with_stop(duration: Duration, stop_flag: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(STOP_CHECK_INTERVAL));
    }
}
