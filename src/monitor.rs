use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::GenerationError;

const DEADLINE_POLL: Duration = Duration::from_millis(50);

/// Cooperative cancellation shared between the host and one job.
///
/// `cancel` is the host's "request stop"; the worker polls `is_cancelled`
/// at every blocking boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Fatal-error flag scoped to one generation job.
///
/// The first reported error wins; later reports are ignored. A new job gets
/// a fresh monitor instead of resetting a shared one.
#[derive(Clone, Debug, Default)]
pub struct ErrorMonitor {
    inner: Arc<MonitorInner>,
}

#[derive(Debug, Default)]
struct MonitorInner {
    occurred: AtomicBool,
    reason: OnceLock<GenerationError>,
}

impl ErrorMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` if no error was recorded yet. Returns `true` when this
    /// call was the first.
    pub fn report(&self, error: GenerationError) -> bool {
        let first = self
            .inner
            .occurred
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if first {
            let _ = self.inner.reason.set(error);
        }

        first
    }

    pub fn has_error_occurred(&self) -> bool {
        self.inner.occurred.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<GenerationError> {
        self.inner.reason.get().cloned()
    }
}

/// True when the job should stop: an error was recorded or the host asked to
/// cancel.
pub fn is_process_stopped(monitor: &ErrorMonitor, cancel: &CancelToken) -> bool {
    monitor.has_error_occurred() || cancel.is_cancelled()
}

/// Watchdog that cancels a job once a time limit passes.
///
/// Exits early when the job's token is cancelled by someone else or the
/// deadline is disarmed.
pub struct Deadline {
    disarmed: CancelToken,
    worker: JoinHandle<()>,
}

impl Deadline {
    pub fn start(cancel: CancelToken, limit: Duration) -> Self {
        let disarmed = CancelToken::new();
        let stop = disarmed.clone();

        let worker = thread::spawn(move || {
            let started = Instant::now();
            loop {
                if stop.is_cancelled() || cancel.is_cancelled() {
                    return;
                }

                let elapsed = started.elapsed();
                if elapsed >= limit {
                    warn!(limit_secs = limit.as_secs_f32(), "time limit reached, cancelling job");
                    cancel.cancel();
                    return;
                }

                thread::sleep((limit - elapsed).min(DEADLINE_POLL));
            }
        });

        Self { disarmed, worker }
    }

    /// Stops the watchdog without touching the job.
    pub fn disarm(self) {
        self.disarmed.cancel();
        let _ = self.worker.join();
    }
}
