//! Deadline for in-process work.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("operation did not finish within {0:?}")]
    Elapsed(Duration),
    #[error("operation panicked")]
    Panicked,
}

/// Runs `f` on a helper thread and waits at most `timeout` for its result.
///
/// On timeout the helper thread is detached and its eventual result
/// discarded; callers must not rely on side effects of `f` after an error.
pub fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, TimeoutError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new()
        .name("metalqms-step".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        });

    if spawned.is_err() {
        return Err(TimeoutError::Panicked);
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(TimeoutError::Elapsed(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(TimeoutError::Panicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_value_in_time() {
        let value = run_with_timeout(Duration::from_secs(1), || 21 * 2).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_elapsed() {
        let result = run_with_timeout(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
        });
        assert_eq!(result, Err(TimeoutError::Elapsed(Duration::from_millis(20))));
    }

    #[test]
    fn test_panic_is_reported() {
        let result: Result<(), _> = run_with_timeout(Duration::from_secs(1), || panic!("boom"));
        assert_eq!(result, Err(TimeoutError::Panicked));
    }
}
