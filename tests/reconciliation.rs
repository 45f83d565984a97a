mod common;

use std::fs;
use std::thread;
use std::time::Duration;

use common::{fast_config, memory_manager, setup_test_env, t, usd};
use money_ledger::{
    core::LedgerManager,
    ledger::{AccountKind, NewTransaction, TimeRange, TransactionPatch},
    reconcile::{ConflictField, ImportBatch, ImportRecord, ReconcileOutcome, RecordState, Resolution},
    storage::RecordKind,
    LedgerError,
};
use tempfile::tempdir;

#[test]
fn reimporting_x1_is_a_no_op() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let batch = ImportBatch::new(
        "statement-1",
        vec![ImportRecord::new(account.id, usd(-4_200), t(3))
            .with_external_id("X1")
            .with_memo("Groceries")],
    );

    let first = manager.import(&batch).unwrap();
    assert_eq!(first.states(1), vec![RecordState::Inserted]);
    assert_eq!(first.ledger_writes, 1);
    let balance = manager.closing_balance(account.id).unwrap();
    let writes = backend.save_count(RecordKind::Transaction);

    let second = manager.import(&batch).unwrap();
    assert_eq!(second.states(1), vec![RecordState::Matched]);
    assert_eq!(second.ledger_writes, 0);
    assert_eq!(backend.save_count(RecordKind::Transaction), writes);
    assert_eq!(manager.closing_balance(account.id).unwrap(), balance);
    assert_eq!(manager.store().transaction_count(), 1);
}

#[test]
fn fingerprint_matching_finds_manual_entries() {
    let (manager, _) = memory_manager(fast_config());
    let account = manager
        .open_account("Card", AccountKind::Credit, usd(0))
        .unwrap();
    let typed = manager
        .record(NewTransaction::new(account.id, usd(-1_299), t(10)).with_memo("Netflix.com"))
        .unwrap();

    let batch = ImportBatch::new(
        "card-feed",
        vec![
            ImportRecord::new(account.id, usd(-1_299), t(30)).with_memo("NETFLIX COM"),
            ImportRecord::new(account.id, usd(-1_299), t(31)).with_memo("Spotify"),
        ],
    );
    let report = manager.import(&batch).unwrap();
    assert_eq!(
        report.entries[0].outcome,
        ReconcileOutcome::Matched {
            transaction_id: typed.id,
            refreshed: true
        }
    );
    assert_eq!(report.entries[1].outcome.state(), RecordState::Inserted);
    let refreshed = manager.transaction(typed.id).unwrap();
    assert_eq!(refreshed.memo, "NETFLIX COM");
    assert_eq!(refreshed.timestamp, t(30));
    assert_eq!(manager.store().transaction_count(), 2);
}

#[test]
fn deleted_imports_stay_deleted() {
    let (manager, _) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let batch = ImportBatch::new(
        "feed",
        vec![ImportRecord::new(account.id, usd(-999), t(1)).with_external_id("dup")],
    );
    let report = manager.import(&batch).unwrap();
    let id = report.entries[0].outcome.transaction_id();
    manager.soft_delete(id, 1).unwrap();

    let again = manager.import(&batch).unwrap();
    assert_eq!(again.count(RecordState::Matched), 1);
    assert_eq!(again.ledger_writes, 0);
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(0));
}

#[test]
fn interrupted_batch_resumes_without_double_inserting() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let records: Vec<_> = (0..6)
        .map(|n| {
            ImportRecord::new(account.id, usd(-(n + 1) * 100), t(n))
                .with_external_id(format!("row-{n}"))
        })
        .collect();
    let batch = ImportBatch::new("nightly", records);

    backend.fail_saves_after(3);
    let err = manager.import(&batch).unwrap_err();
    match &err {
        LedgerError::BatchInterrupted { processed, .. } => assert_eq!(*processed, 3),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(manager.store().transaction_count(), 3);

    backend.clear_faults();
    // The failed checkpoint write leaves nothing to resume from; the rerun
    // still matches the committed rows by external id.
    let report = manager.import(&batch).unwrap();
    assert_eq!(report.totals.inserted, 3);
    assert_eq!(report.totals.matched, 3);
    assert_eq!(manager.store().transaction_count(), 6);
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(-2_100));
}

#[test]
fn timed_out_insert_that_lands_late_is_not_written_twice() {
    let mut config = fast_config();
    config.storage.timeout_ms = 30;
    let (manager, backend) = memory_manager(config.clone());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let batch = ImportBatch::new(
        "slow",
        vec![ImportRecord::new(account.id, usd(-500), t(1)).with_external_id("S1")],
    );

    backend.set_save_delay(Some(Duration::from_millis(120)));
    let err = manager.import(&batch).unwrap_err();
    assert!(matches!(err, LedgerError::BatchInterrupted { processed: 0, .. }));
    assert_eq!(manager.store().transaction_count(), 0);

    // Let the queued writes finish behind the caller's back.
    thread::sleep(Duration::from_millis(400));
    backend.clear_faults();
    assert_eq!(backend.record_count(RecordKind::Transaction), 1);

    let report = manager.import(&batch).unwrap();
    assert_eq!(report.count(RecordState::Inserted), 1);
    assert_eq!(manager.store().transaction_count(), 1);
    assert_eq!(backend.record_count(RecordKind::Transaction), 1);
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(-500));

    let again = manager.import(&batch).unwrap();
    assert_eq!(again.count(RecordState::Matched), 1);
    assert_eq!(again.ledger_writes, 0);

    let reopened = LedgerManager::open(backend.clone(), config).unwrap();
    assert_eq!(reopened.closing_balance(account.id).unwrap(), usd(-500));
    assert_eq!(reopened.store().transaction_count(), 1);
}

#[test]
fn repeated_external_id_in_one_batch_is_refused_up_front() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let batch = ImportBatch::new(
        "doubled",
        vec![
            ImportRecord::new(account.id, usd(-100), t(1)).with_external_id("X1"),
            ImportRecord::new(account.id, usd(-200), t(2)).with_external_id("X1"),
        ],
    );
    let writes = backend.save_count(RecordKind::Transaction);

    for _ in 0..4 {
        let err = manager.import(&batch).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(ref msg) if msg.contains("X1")));
    }
    assert_eq!(backend.save_count(RecordKind::Transaction), writes);
    assert_eq!(manager.store().transaction_count(), 0);
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(0));
    assert!(manager
        .reconciler()
        .checkpoint(manager.store(), "doubled")
        .unwrap()
        .is_none());

    // The same external id on two different accounts is fine.
    let other = manager
        .open_account("B", AccountKind::Bank, usd(0))
        .unwrap();
    let split = ImportBatch::new(
        "split",
        vec![
            ImportRecord::new(account.id, usd(-100), t(1)).with_external_id("X1"),
            ImportRecord::new(other.id, usd(-200), t(2)).with_external_id("X1"),
        ],
    );
    let report = manager.import(&split).unwrap();
    assert_eq!(report.count(RecordState::Inserted), 2);
    let rerun = manager.import(&split).unwrap();
    assert_eq!(rerun.ledger_writes, 0);
}

#[test]
fn checkpoint_lets_a_rerun_skip_committed_records() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let records: Vec<_> = (0..4)
        .map(|n| ImportRecord::new(account.id, usd(-50), t(n * 24)).with_memo(format!("Fee {n}")))
        .collect();
    let batch = ImportBatch::new("fees", records);

    manager.import(&ImportBatch::new("fees", batch.records[..2].to_vec())).unwrap();
    let inserted_before = manager.store().transaction_count();
    assert_eq!(inserted_before, 2);

    backend.fail_next_saves(1);
    let err = manager.import(&batch).unwrap_err();
    assert!(matches!(err, LedgerError::BatchInterrupted { processed: 2, .. }));
    let checkpoint = manager
        .reconciler()
        .checkpoint(manager.store(), "fees")
        .unwrap()
        .expect("checkpoint saved");
    assert_eq!(checkpoint.next_index, 2);
    assert!(!checkpoint.completed);

    let report = manager.import(&batch).unwrap();
    assert_eq!(report.resumed_from, 2);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.totals.matched, 2);
    assert_eq!(report.totals.inserted, 2);
    assert_eq!(manager.store().transaction_count(), 4);
    let done = manager
        .reconciler()
        .checkpoint(manager.store(), "fees")
        .unwrap()
        .unwrap();
    assert!(done.completed);
}

#[test]
fn local_edits_surface_as_conflicts_and_can_be_resolved() {
    let (manager, _) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let imported = ImportRecord::new(account.id, usd(-8_000), t(5))
        .with_external_id("rent-jan")
        .with_memo("Rent");
    manager
        .import(&ImportBatch::new("jan", vec![imported.clone()]))
        .unwrap();
    let local = manager
        .store()
        .find_by_external_id(account.id, "rent-jan")
        .unwrap();
    manager
        .edit(local.id, TransactionPatch::new().memo("Rent (split with roommate)"), 1)
        .unwrap();

    let corrected = imported.clone().with_memo("Rent January");
    let report = manager
        .import(&ImportBatch::new("jan-corrected", vec![corrected.clone()]))
        .unwrap();
    assert_eq!(report.ledger_writes, 0);
    let conflict = report.conflicts()[0].clone();
    assert_eq!(conflict.differences[0].field, ConflictField::Memo);
    assert_eq!(conflict.local_version, 2);

    let kept = manager
        .resolve_conflict(&conflict, Resolution::KeepLocal)
        .unwrap();
    assert_eq!(kept.memo, "Rent (split with roommate)");

    let accepted = manager
        .resolve_conflict(&conflict, Resolution::AcceptImported)
        .unwrap();
    assert_eq!(accepted.memo, "Rent January");
    assert_eq!(accepted.version, 3);
    assert!(!accepted.manually_edited());

    let rerun = manager
        .import(&ImportBatch::new("jan-corrected-2", vec![corrected]))
        .unwrap();
    assert_eq!(rerun.count(RecordState::Matched), 1);

    let err = manager
        .resolve_conflict(&conflict, Resolution::AcceptImported)
        .unwrap_err();
    assert!(matches!(err, LedgerError::VersionConflict { .. }));
}

#[test]
fn import_file_from_json() {
    let (manager, _) = setup_test_env();
    manager
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("march.json");
    fs::write(
        &path,
        r#"[
            {"external_id": "m-1", "account": "Checking", "amount": "-12.34", "timestamp": "2025-03-01", "memo": "Cafe"},
            {"external_id": "m-2", "account": "Checking", "amount": 2500, "timestamp": "2025-03-02T09:00:00+02:00"}
        ]"#,
    )
    .unwrap();

    let report = manager.import_file(&path).unwrap();
    assert_eq!(report.batch_id, "march");
    assert_eq!(report.count(RecordState::Inserted), 2);
    let account = manager.store().account_by_name("Checking").unwrap();
    let rows: Vec<_> = manager
        .store()
        .list_by_account(account.id, TimeRange::all())
        .unwrap()
        .collect();
    assert_eq!(rows[0].amount, usd(-1_234));
    assert_eq!(rows[1].amount, usd(250_000));
    assert_eq!(rows[1].timestamp.to_rfc3339(), "2025-03-02T07:00:00+00:00");

    let again = manager.import_file(&path).unwrap();
    assert_eq!(again.ledger_writes, 0);
}
