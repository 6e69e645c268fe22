//! Time sources. Everything that compares against "now" takes a [`Clock`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Wall-clock time, persisted in the database.
    fn now(&self) -> DateTime<Utc>;
    /// Monotonic time, used for rate limiting and durations.
    fn instant(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    state: Mutex<(DateTime<Utc>, Instant)>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new((start, Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
            state.0 += delta;
            state.1 += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut state) = self.state.lock() {
            state.0 = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().map(|s| s.0).unwrap_or_else(|p| p.into_inner().0)
    }

    fn instant(&self) -> Instant {
        self.state.lock().map(|s| s.1).unwrap_or_else(|p| p.into_inner().1)
    }
}

/// Blocks the calling thread. Retry and rate-limit waits go through this so
/// tests can record delays instead of sleeping.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}
