use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::Error;

/// Future returned by [`Timer::after`]. Dropping it before completion releases the timer.
pub type TimerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wall-clock abstraction used for delays and for leader rotation.
#[cfg_attr(test, mockall::automock)]
pub trait Timer: Send + Sync {
    /// Resolves once `duration` has elapsed.
    fn after(&self, duration: Duration) -> TimerFuture;

    /// Current unix timestamp, in seconds.
    fn now_unix(&self) -> i64;

    fn start(&self);

    fn close(&self) -> Result<(), Error>;
}

/// [`Timer`] backed by the tokio clock and the system time.
#[derive(Debug, Default)]
pub struct SystemTimer {
    started: AtomicBool,
}

impl SystemTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Timer for SystemTimer {
    fn after(&self, duration: Duration) -> TimerFuture {
        Box::pin(tokio::time::sleep(duration))
    }

    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn close(&self) -> Result<(), Error> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
