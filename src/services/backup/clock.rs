//! Time sources for the scheduler.
//!
//! Both the tokio implementations follow the runtime clock, so tests running
//! under `start_paused = true` control them by advancing time.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::utils::error::{AppError, AppResult};

/// Monotonic clock
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Clock backed by `tokio::time::Instant`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot delayed callbacks
pub trait Timer: Send + Sync + 'static {
    /// Run `callback` once `delay` has elapsed, unless cancelled first.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Handle to a scheduled callback.
///
/// Cancelling only stops a callback that has not fired yet. Dropping the
/// handle does not cancel anything.
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Timer that sleeps on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: Handle,
}

impl TokioTimer {
    /// Bind to the runtime of the calling context.
    pub fn new() -> AppResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| AppError::internal(format!("No tokio runtime available: {}", e)))?;
        Ok(Self { handle })
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        // The callback never awaits, so an abort can only land during the sleep.
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(task.abort_handle())
    }
}
