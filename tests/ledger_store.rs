mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{fast_config, memory_manager, t, usd};
use money_ledger::{
    ledger::{AccountKind, NewTransaction, TimeRange, TransactionPatch},
    LedgerError, Money,
};

#[test]
fn soft_delete_example_updates_balance() {
    let (manager, _) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    manager
        .record(NewTransaction::new(account.id, usd(500), t(1)))
        .unwrap();
    let debit = manager
        .record(NewTransaction::new(account.id, usd(-200), t(2)))
        .unwrap();
    assert_eq!(manager.balance_as_of(account.id, t(2)).unwrap(), usd(300));

    manager.soft_delete(debit.id, debit.version).unwrap();
    assert_eq!(manager.balance_as_of(account.id, t(2)).unwrap(), usd(500));

    let tombstone = manager.transaction(debit.id).unwrap();
    assert!(tombstone.deleted);
    assert_eq!(tombstone.version, 2);
}

#[test]
fn list_by_account_orders_by_time_then_id_and_hides_tombstones() {
    let (manager, _) = memory_manager(fast_config());
    let store = manager.store();
    let account = store
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();
    let mut ids = Vec::new();
    for hour in [5, 1, 3, 3, 2] {
        ids.push(store.append(NewTransaction::new(account.id, usd(hour), t(hour))).unwrap());
    }
    store.soft_delete(ids[4].id, 1).unwrap();

    let live: Vec<_> = store
        .list_by_account(account.id, TimeRange::all())
        .unwrap()
        .with_page_size(2)
        .collect();
    assert_eq!(live.len(), 4);
    for pair in live.windows(2) {
        assert!((pair[0].timestamp, pair[0].id) < (pair[1].timestamp, pair[1].id));
    }

    let audit = store
        .list_by_account(account.id, TimeRange::between(t(2), t(4)))
        .unwrap()
        .including_deleted()
        .count();
    assert_eq!(audit, 3);
}

#[test]
fn stale_version_edit_fails_without_mutating() {
    let (manager, backend) = memory_manager(fast_config());
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let txn = manager
        .record(NewTransaction::new(account.id, usd(-100), t(1)).with_memo("first"))
        .unwrap();
    let edited = manager
        .edit(txn.id, TransactionPatch::new().memo("second"), 1)
        .unwrap();
    assert_eq!(edited.version, 2);
    let writes = backend.save_count(money_ledger::storage::RecordKind::Transaction);

    let err = manager
        .edit(txn.id, TransactionPatch::new().memo("stale"), 1)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::VersionConflict { expected: 1, actual: 2, .. }
    ));
    assert!(err.is_retryable());
    let stored = manager.transaction(txn.id).unwrap();
    assert_eq!(stored.memo, "second");
    assert_eq!(stored.version, 2);
    assert_eq!(
        backend.save_count(money_ledger::storage::RecordKind::Transaction),
        writes
    );
}

#[test]
fn racing_edits_on_one_version_have_exactly_one_winner() {
    let (manager, _) = memory_manager(fast_config());
    let manager = Arc::new(manager);
    let account = manager
        .open_account("A", AccountKind::Bank, usd(0))
        .unwrap();
    let txn = manager
        .record(NewTransaction::new(account.id, usd(-100), t(1)))
        .unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.edit(txn.id, TransactionPatch::new().memo(format!("writer {n}")), 1)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, LedgerError::VersionConflict { .. })));
    assert_eq!(manager.transaction(txn.id).unwrap().version, 2);
}

#[test]
fn external_ids_are_unique_per_account() {
    let (manager, _) = memory_manager(fast_config());
    let checking = manager
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();
    let savings = manager
        .open_account("Savings", AccountKind::Bank, usd(0))
        .unwrap();
    let first = manager
        .record(NewTransaction::new(checking.id, usd(-1), t(1)).with_external_id("X1"))
        .unwrap();
    manager.soft_delete(first.id, 1).unwrap();

    let err = manager
        .record(NewTransaction::new(checking.id, usd(-1), t(1)).with_external_id("X1"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateExternalId { existing, .. } if existing == first.id));
    assert!(manager
        .record(NewTransaction::new(savings.id, usd(-1), t(1)).with_external_id("X1"))
        .is_ok());
}

#[test]
fn foreign_amounts_need_a_conversion() {
    let (manager, _) = memory_manager(fast_config());
    let account = manager
        .open_account("Checking", AccountKind::Bank, usd(0))
        .unwrap();
    let euros = Money::from_minor(-1_000, "EUR");
    let err = manager
        .record(NewTransaction::new(account.id, euros.clone(), t(1)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));

    let txn = manager
        .record(
            NewTransaction::new(account.id, euros, t(1))
                .with_conversion(money_ledger::ledger::Conversion::new(usd(-1_090))),
        )
        .unwrap();
    assert_eq!(txn.settled_amount(), &usd(-1_090));
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(-1_090));
}

#[test]
fn archived_accounts_reject_new_rows_but_keep_history() {
    let (manager, _) = memory_manager(fast_config());
    let account = manager
        .open_account("Old card", AccountKind::Credit, usd(0))
        .unwrap();
    manager
        .record(NewTransaction::new(account.id, usd(-700), t(1)))
        .unwrap();
    manager.archive_account(account.id, account.version).unwrap();

    let err = manager
        .record(NewTransaction::new(account.id, usd(-1), t(2)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountArchived(id) if id == account.id));
    assert_eq!(manager.closing_balance(account.id).unwrap(), usd(-700));
}

#[test]
fn category_cycles_are_rejected_and_tree_unchanged() {
    let (manager, _) = memory_manager(fast_config());
    let home = manager.add_category("Home", None).unwrap();
    let utilities = manager.add_category("Utilities", Some(home.id)).unwrap();
    let power = manager.add_category("Power", Some(utilities.id)).unwrap();

    let before = manager.store().categories();
    let err = manager
        .move_category(home.id, Some(power.id), home.version)
        .unwrap_err();
    assert!(matches!(err, LedgerError::CategoryCycle { .. }));
    assert_eq!(manager.store().categories(), before);

    let err = manager
        .move_category(home.id, Some(home.id), home.version)
        .unwrap_err();
    assert!(matches!(err, LedgerError::CategoryCycle { .. }));
    assert_eq!(
        manager.store().category_tree().path_name(power.id).unwrap(),
        "Home / Utilities / Power"
    );
}
