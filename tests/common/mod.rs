#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use money_ledger::{
    config::{ConfigManager, LedgerConfig, RetryPolicy},
    core::LedgerManager,
    storage::MemoryStorage,
    Money,
};
use once_cell::sync::Lazy;
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Creates a JSON-backed manager and a config manager rooted in a fresh
/// temporary directory.
pub fn setup_test_env() -> (LedgerManager, ConfigManager) {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);

    let configs = ConfigManager::with_base_dir(base).expect("create config manager for temp dir");
    let manager = LedgerManager::from_config(&configs).expect("open ledger in temp dir");
    (manager, configs)
}

/// Config that fails fast: no retries, short storage timeout.
pub fn fast_config() -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.retry = RetryPolicy::no_retry();
    config.storage.timeout_ms = 200;
    config
}

/// In-memory manager plus a handle on its backend for fault injection.
pub fn memory_manager(config: LedgerConfig) -> (LedgerManager, Arc<MemoryStorage>) {
    let backend = Arc::new(MemoryStorage::new());
    let manager = LedgerManager::open(backend.clone(), config).expect("open in-memory ledger");
    (manager, backend)
}

pub fn usd(minor: i64) -> Money {
    Money::from_minor(minor, "USD")
}

/// `2025-01-01T00:00Z` plus `hours`.
pub fn t(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}
