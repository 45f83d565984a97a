use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::currency::CurrencyCode;
use crate::errors::{LedgerError, Result};

const HOME_ENV: &str = "MONEY_LEDGER_HOME";
const DEFAULT_DIR_NAME: &str = ".money_ledger";
const CONFIG_DIR: &str = "config";
const CONFIG_FILE: &str = "config.json";
const DATA_DIR: &str = "data";
const TMP_SUFFIX: &str = "tmp";

/// Runtime settings for a ledger instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub base_currency: CurrencyCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub storage: StorageSettings,
    pub retry: RetryPolicy,
    pub snapshots: SnapshotPolicy,
    pub reconcile: ReconcileSettings,
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: CurrencyCode::default(),
            data_dir: None,
            storage: StorageSettings::default(),
            retry: RetryPolicy::default(),
            snapshots: SnapshotPolicy::default(),
            reconcile: ReconcileSettings::default(),
            log_filter: "money_ledger=info".into(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_currency.as_str().len() != 3 {
            return Err(LedgerError::Config(format!(
                "base currency `{}` is not a three-letter code",
                self.base_currency
            )));
        }
        if self.storage.timeout_ms == 0 {
            return Err(LedgerError::Config("storage.timeout_ms must be positive".into()));
        }
        if self.storage.page_size == 0 {
            return Err(LedgerError::Config("storage.page_size must be positive".into()));
        }
        if self.snapshots.interval == 0 {
            return Err(LedgerError::Config("snapshots.interval must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.reconcile.memo_similarity) {
            return Err(LedgerError::Config(
                "reconcile.memo_similarity must be between 0 and 1".into(),
            ));
        }
        if self.reconcile.amount_tolerance_minor < 0 || self.reconcile.timestamp_tolerance_secs < 0 {
            return Err(LedgerError::Config("reconcile tolerances cannot be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Upper bound on a single storage call.
    pub timeout_ms: u64,
    /// Rows fetched per page by lazy account listings.
    pub page_size: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            page_size: 256,
        }
    }
}

impl StorageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << shift)
            .min(self.max_backoff_ms.max(self.initial_backoff_ms));
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotPolicy {
    /// Minimum number of entries a balance query must scan before its result
    /// is kept as a snapshot.
    pub interval: usize,
    pub max_per_account: usize,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            interval: 64,
            max_per_account: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub timestamp_tolerance_secs: i64,
    pub amount_tolerance_minor: i64,
    pub memo_similarity: f64,
    /// Progress is checkpointed every this many records (0 disables periodic
    /// checkpoints; interruptions always write one).
    pub checkpoint_every: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: 2 * 24 * 60 * 60,
            amount_tolerance_minor: 0,
            memo_similarity: 0.6,
            checkpoint_every: 250,
        }
    }
}

/// Resolves the application home, honoring `MONEY_LEDGER_HOME`.
pub fn app_home() -> PathBuf {
    if let Ok(custom) = env::var(HOME_ENV) {
        if !custom.trim().is_empty() {
            return PathBuf::from(custom);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

/// Directory holding ledger records for `config`, defaulting under `base`.
pub fn resolve_data_dir(config: &LedgerConfig, base: &Path) -> PathBuf {
    config
        .data_dir
        .clone()
        .unwrap_or_else(|| base.join(DATA_DIR))
}

/// Loads and stores [`LedgerConfig`] under `<home>/config/config.json`.
pub struct ConfigManager {
    base: PathBuf,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_base_dir(app_home())
    }

    pub fn with_base_dir(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        let config_root = base.join(CONFIG_DIR);
        fs::create_dir_all(&config_root).map_err(config_io)?;
        Ok(Self {
            path: config_root.join(CONFIG_FILE),
            base,
        })
    }

    pub fn load(&self) -> Result<LedgerConfig> {
        if !self.path.exists() {
            return Ok(LedgerConfig::default());
        }
        let data = fs::read_to_string(&self.path).map_err(config_io)?;
        let config: LedgerConfig = serde_json::from_str(&data)
            .map_err(|err| LedgerError::Config(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &LedgerConfig) -> Result<()> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config)
            .map_err(|err| LedgerError::Config(err.to_string()))?;
        let tmp = tmp_path(&self.path);
        write_atomic(&tmp, &json).map_err(config_io)?;
        fs::rename(&tmp, &self.path).map_err(config_io)?;
        Ok(())
    }

    pub fn data_dir(&self, config: &LedgerConfig) -> PathBuf {
        resolve_data_dir(config, &self.base)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn config_io(err: std::io::Error) -> LedgerError {
    LedgerError::Config(format!("configuration io error: {}", err.kind()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    tmp.set_extension(format!("json.{TMP_SUFFIX}"));
    tmp
}

fn write_atomic(path: &Path, data: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_defaults_when_missing() {
        let temp = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path()).unwrap();
        assert_eq!(manager.load().unwrap(), LedgerConfig::default());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let temp = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path()).unwrap();
        let mut config = LedgerConfig::default();
        config.base_currency = CurrencyCode::new("eur");
        config.reconcile.memo_similarity = 0.8;
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.base_currency.as_str(), "EUR");
        assert_eq!(loaded.reconcile.memo_similarity, 0.8);
        assert!(!tmp_path(manager.path()).exists());
    }

    #[test]
    fn partial_files_fill_defaults() {
        let temp = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path()).unwrap();
        fs::write(manager.path(), r#"{"storage": {"timeout_ms": 10}}"#).unwrap();
        let loaded = manager.load().unwrap();
        assert_eq!(loaded.storage.timeout_ms, 10);
        assert_eq!(loaded.storage.page_size, StorageSettings::default().page_size);
        assert_eq!(manager.data_dir(&loaded), temp.path().join("data"));
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let mut config = LedgerConfig::default();
        config.reconcile.memo_similarity = 1.5;
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 35,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(35));
    }
}
