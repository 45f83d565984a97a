pub mod build_info;

use std::sync::{Mutex, MutexGuard, Once, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::errors::{LedgerError, Result};

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber once per process and logs the
/// build summary. Later calls are no-ops.
///
/// `RUST_LOG` wins over `default_directive` when set. Events go to stderr so
/// command output stays clean.
pub fn init_tracing(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive))
            .unwrap_or_else(|_| EnvFilter::new("money_ledger=info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        tracing::debug!(build = %build_info::current().summary(), "money_ledger tracing initialized");
    });
}

// State behind these locks is swapped in single assignments, so a panic in
// another holder never leaves it half-written.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted, sleeping with exponential backoff between
/// attempts.
pub fn retry_with_backoff<T>(
    policy: &RetryPolicy,
    label: &str,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(%label, attempt, ?delay, error = %err, "retrying after retryable failure");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Convenience for building an [`LedgerError::InvalidInput`].
pub(crate) fn invalid(message: impl Into<String>) -> LedgerError {
    LedgerError::InvalidInput(message.into())
}
