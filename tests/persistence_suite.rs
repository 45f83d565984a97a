mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{fast_config, memory_manager, t, usd};
use money_ledger::{
    config::{ConfigManager, LedgerConfig},
    core::LedgerManager,
    errors::PersistenceKind,
    ledger::{AccountKind, BudgetPeriod, BudgetRule, NewTransaction, TransactionPatch},
    reconcile::{ImportBatch, ImportRecord},
    storage::{JsonFileStorage, RecordKind},
    CurrencyCode, LedgerError,
};
use tempfile::tempdir;

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.tmp", existing),
        None => String::from("tmp"),
    };
    tmp.set_extension(ext);
    tmp
}

fn leftover_tmp_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(".tmp") {
                found.push(path);
            }
        }
    }
    found
}

#[test]
fn ledger_survives_reopen_from_json_files() {
    let temp = tempdir().unwrap();
    let data_dir = temp.path().join("data");
    let (account_id, kept_id, deleted_id, category_id) = {
        let manager = LedgerManager::open_dir(&data_dir, LedgerConfig::default()).unwrap();
        let account = manager
            .open_account("Checking", AccountKind::Bank, usd(10_000))
            .unwrap();
        let groceries = manager.add_category("Groceries", None).unwrap();
        manager
            .set_budget(
                groceries.id,
                Some(BudgetRule::new(usd(40_000), BudgetPeriod::Monthly)),
                groceries.version,
            )
            .unwrap();
        let kept = manager
            .record(
                NewTransaction::new(account.id, usd(-2_500), t(1))
                    .with_category(groceries.id)
                    .with_external_id("bank-1"),
            )
            .unwrap();
        let edited = manager
            .edit(kept.id, TransactionPatch::new().memo("Weekly shop"), kept.version)
            .unwrap();
        assert_eq!(edited.version, 2);
        let deleted = manager
            .record(NewTransaction::new(account.id, usd(-900), t(2)))
            .unwrap();
        manager.soft_delete(deleted.id, deleted.version).unwrap();
        (account.id, kept.id, deleted.id, groceries.id)
    };

    let reopened = LedgerManager::open_dir(&data_dir, LedgerConfig::default()).unwrap();
    assert_eq!(reopened.closing_balance(account_id).unwrap(), usd(7_500));
    let kept = reopened.transaction(kept_id).unwrap();
    assert_eq!(kept.memo, "Weekly shop");
    assert_eq!(kept.version, 2);
    assert!(reopened.transaction(deleted_id).unwrap().deleted);

    // Hydrated external ids still guard against duplicates.
    let err = reopened
        .record(NewTransaction::new(account_id, usd(-1), t(3)).with_external_id("bank-1"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateExternalId { .. }));

    let category = reopened.store().category(category_id).unwrap();
    assert_eq!(category.budget.unwrap().limit, usd(40_000));
    assert!(leftover_tmp_files(&data_dir).is_empty());
}

#[test]
fn failed_write_keeps_previous_file_and_memory_state() {
    let temp = tempdir().unwrap();
    let data_dir = temp.path().join("data");
    let manager = LedgerManager::open_dir(&data_dir, fast_config()).unwrap();
    let account = manager
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();
    let txn = manager
        .record(NewTransaction::new(account.id, usd(-100), t(1)).with_memo("before"))
        .unwrap();

    let storage = JsonFileStorage::new(data_dir.clone()).unwrap();
    let path = storage.record_path(RecordKind::Transaction, &txn.id.to_string());
    let original = fs::read_to_string(&path).expect("record file written");

    // A directory where the temp file should go makes the write fail.
    fs::create_dir_all(tmp_path_for(&path)).unwrap();
    let err = manager
        .edit(txn.id, TransactionPatch::new().memo("after"), txn.version)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Persistence {
            kind: PersistenceKind::Io,
            ..
        }
    ));

    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    let stored = manager.transaction(txn.id).unwrap();
    assert_eq!(stored.memo, "before");
    assert_eq!(stored.version, 1);
}

#[test]
fn slow_backend_surfaces_a_timeout() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();

    backend.set_save_delay(Some(Duration::from_millis(600)));
    let err = manager
        .record(NewTransaction::new(account.id, usd(-100), t(1)))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Persistence {
            kind: PersistenceKind::Timeout,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(manager.store().transaction_count(), 0);
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(0));
}

#[test]
fn unavailable_backend_interrupts_an_import() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();
    backend.fail_next_saves(1);

    let batch = ImportBatch::new(
        "single",
        vec![ImportRecord::new(account.id, usd(-300), t(1)).with_external_id("s-1")],
    );
    let err = manager.import(&batch).unwrap_err();
    let LedgerError::BatchInterrupted { processed, source, .. } = err else {
        panic!("expected an interrupted batch");
    };
    assert_eq!(processed, 0);
    assert!(matches!(
        *source,
        LedgerError::Persistence {
            kind: PersistenceKind::Unavailable,
            ..
        }
    ));
    assert_eq!(backend.record_count(RecordKind::Transaction), 0);
    assert_eq!(backend.record_count(RecordKind::Checkpoint), 1);
}

#[test]
fn config_round_trips_through_disk() {
    let temp = tempdir().unwrap();
    let configs = ConfigManager::with_base_dir(temp.path()).unwrap();
    assert_eq!(configs.load().unwrap(), LedgerConfig::default());

    let mut config = LedgerConfig::default();
    config.base_currency = CurrencyCode::new("EUR");
    config.snapshots.interval = 16;
    config.reconcile.memo_similarity = 0.8;
    configs.save(&config).unwrap();

    assert_eq!(configs.load().unwrap(), config);
    assert!(leftover_tmp_files(temp.path()).is_empty());
    assert_eq!(configs.data_dir(&config), temp.path().join("data"));

    config.storage.timeout_ms = 0;
    assert!(matches!(configs.save(&config), Err(LedgerError::Config(_))));
}
