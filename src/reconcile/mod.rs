//! Idempotent merge of externally sourced transactions into the ledger.
//!
//! Each import record moves `Pending -> Matched | Inserted | Conflicted` and
//! is committed as its own ledger write, so an interrupted batch keeps the
//! records it already processed and resumes from its checkpoint.

pub mod checkpoint;
pub mod fingerprint;
pub mod import;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::{RuleSet, TransactionFacts};
use crate::config::{ReconcileSettings, RetryPolicy};
use crate::currency::{CurrencyCode, Money};
use crate::errors::{LedgerError, Result};
use crate::ledger::{EditOrigin, LedgerStore, NewTransaction, Transaction, TransactionPatch};
use crate::utils::{invalid, lock, retry_with_backoff};

pub use checkpoint::{BatchCheckpoint, BatchTotals};
pub use fingerprint::{memo_similarity, normalize_memo, FingerprintMatcher, MatchScore};
pub use import::{parse_import, read_import_file};

/// Namespace for the ids of rows created by an import.
const IMPORT_NAMESPACE: Uuid = Uuid::from_u128(0x6d6f_6e65_795f_4c65_6467_6572_5f69_6d70);

/// One externally sourced transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub external_id: Option<String>,
    pub account_id: Uuid,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub memo: String,
}

impl ImportRecord {
    pub fn new(account_id: Uuid, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self {
            external_id: None,
            account_id,
            amount,
            timestamp,
            memo: String::new(),
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn currency(&self) -> &CurrencyCode {
        self.amount.currency()
    }

    fn patch(&self) -> TransactionPatch {
        TransactionPatch::new()
            .amount(self.amount.clone())
            .timestamp(self.timestamp)
            .memo(self.memo.clone())
    }
}

/// Ordered import records sharing a batch id. The id keys the resume
/// checkpoint, so re-running the same source must reuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBatch {
    pub id: String,
    pub records: Vec<ImportRecord>,
}

impl ImportBatch {
    pub fn new(id: impl Into<String>, records: Vec<ImportRecord>) -> Self {
        Self {
            id: id.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    Matched,
    Inserted,
    Conflicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Amount,
    Timestamp,
    Memo,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConflictField::Amount => "amount",
            ConflictField::Timestamp => "timestamp",
            ConflictField::Memo => "memo",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDifference {
    pub field: ConflictField,
    pub local: String,
    pub imported: String,
}

/// Import record whose match was edited locally; left for a manual decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConflict {
    pub batch_id: String,
    pub index: usize,
    pub record: ImportRecord,
    pub transaction_id: Uuid,
    pub local_version: u64,
    pub differences: Vec<FieldDifference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Existing row found. `refreshed` is set when an unedited row was
    /// updated to the imported values.
    Matched { transaction_id: Uuid, refreshed: bool },
    Inserted { transaction_id: Uuid },
    Conflicted(ReconcileConflict),
}

impl ReconcileOutcome {
    pub fn state(&self) -> RecordState {
        match self {
            ReconcileOutcome::Matched { .. } => RecordState::Matched,
            ReconcileOutcome::Inserted { .. } => RecordState::Inserted,
            ReconcileOutcome::Conflicted(_) => RecordState::Conflicted,
        }
    }

    pub fn transaction_id(&self) -> Uuid {
        match self {
            ReconcileOutcome::Matched { transaction_id, .. }
            | ReconcileOutcome::Inserted { transaction_id } => *transaction_id,
            ReconcileOutcome::Conflicted(conflict) => conflict.transaction_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEntry {
    pub index: usize,
    pub external_id: Option<String>,
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub batch_id: String,
    /// Records before this index were handled by an earlier, interrupted run.
    pub resumed_from: usize,
    /// Outcomes of the records processed by this run.
    pub entries: Vec<ReconcileEntry>,
    /// Counters including earlier runs of the same batch.
    pub totals: BatchTotals,
    /// Ledger appends and edits performed by this run.
    pub ledger_writes: usize,
}

impl ReconcileReport {
    /// State of every record in the batch; records handled by an earlier run
    /// report `Pending` because this run did not revisit them.
    pub fn states(&self, batch_len: usize) -> Vec<RecordState> {
        let mut states = vec![RecordState::Pending; batch_len];
        for entry in &self.entries {
            if let Some(state) = states.get_mut(entry.index) {
                *state = entry.outcome.state();
            }
        }
        states
    }

    pub fn count(&self, state: RecordState) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.state() == state)
            .count()
    }

    pub fn conflicts(&self) -> Vec<&ReconcileConflict> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                ReconcileOutcome::Conflicted(conflict) => Some(conflict),
                _ => None,
            })
            .collect()
    }
}

/// Manual decision for a [`ReconcileConflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AcceptImported,
    KeepLocal,
}

pub struct ReconciliationEngine {
    settings: ReconcileSettings,
    retry: RetryPolicy,
    matcher: FingerprintMatcher,
    running: Mutex<HashSet<String>>,
}

impl ReconciliationEngine {
    pub fn new(settings: ReconcileSettings, retry: RetryPolicy) -> Self {
        Self {
            matcher: FingerprintMatcher::new(&settings),
            settings,
            retry,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Reconciles `batch` against the ledger. New rows are categorized with
    /// `rules`.
    ///
    /// On a failure that survives the retry policy, progress is checkpointed
    /// and [`LedgerError::BatchInterrupted`] is returned; running the same
    /// batch again resumes after the last committed record.
    pub fn run(&self, store: &LedgerStore, rules: &RuleSet, batch: &ImportBatch) -> Result<ReconcileReport> {
        let _running = RunGuard::acquire(&self.running, &batch.id)?;
        self.validate(store, batch)?;

        let saved = checkpoint::load(store.queue(), &batch.id)?;
        let (start, mut totals) = match saved.as_ref() {
            Some(cp) if !cp.completed && cp.total == batch.len() => (cp.next_index, cp.totals.clone()),
            Some(cp) if !cp.completed => {
                warn!(batch = %batch.id, expected = cp.total, found = batch.len(), "checkpoint does not fit batch; starting over");
                (0, BatchTotals::default())
            }
            _ => (0, BatchTotals::default()),
        };
        let mut checkpointed = saved.is_some();

        // Re-claim rows matched by the earlier run so later records cannot
        // bind to them again.
        let mut claimed = HashSet::new();
        for record in &batch.records[..start] {
            if let Some(txn) = self.find_match(store, record, &claimed) {
                claimed.insert(txn.id);
            }
        }

        info!(batch = %batch.id, records = batch.len(), resumed_from = start, "reconciliation started");
        let mut entries = Vec::with_capacity(batch.len() - start);
        let mut ledger_writes = 0;
        for index in start..batch.len() {
            let insert_id = insert_id_for(batch, index);
            let attempt = retry_with_backoff(&self.retry, &batch.id, || {
                self.reconcile_record(store, rules, batch, index, insert_id, &claimed)
            });
            let (outcome, wrote) = match attempt {
                Ok(done) => done,
                Err(source) => {
                    let resume = BatchCheckpoint::new(&batch.id, index, batch.len(), totals);
                    if let Err(err) = checkpoint::save(store.queue(), &resume) {
                        warn!(batch = %batch.id, error = %err, "could not persist import checkpoint");
                    }
                    warn!(batch = %batch.id, index, error = %source, "reconciliation interrupted");
                    return Err(LedgerError::BatchInterrupted {
                        batch: batch.id.clone(),
                        processed: index,
                        source: Box::new(source),
                    });
                }
            };
            if wrote {
                ledger_writes += 1;
            }
            claimed.insert(outcome.transaction_id());
            totals.record(&outcome);
            entries.push(ReconcileEntry {
                index,
                external_id: batch.records[index].external_id.clone(),
                outcome,
            });

            let next = index + 1;
            let every = self.settings.checkpoint_every;
            if every > 0 && next % every == 0 && next < batch.len() {
                let progress = BatchCheckpoint::new(&batch.id, next, batch.len(), totals.clone());
                match checkpoint::save(store.queue(), &progress) {
                    Ok(()) => checkpointed = true,
                    Err(err) => warn!(batch = %batch.id, error = %err, "periodic checkpoint failed"),
                }
            }
        }

        if checkpointed {
            let done = BatchCheckpoint::new(&batch.id, batch.len(), batch.len(), totals.clone());
            if let Err(err) = checkpoint::save(store.queue(), &done) {
                warn!(batch = %batch.id, error = %err, "could not mark batch complete");
            }
        }

        info!(
            batch = %batch.id,
            matched = totals.matched,
            inserted = totals.inserted,
            conflicted = totals.conflicted,
            ledger_writes,
            "reconciliation finished"
        );
        Ok(ReconcileReport {
            batch_id: batch.id.clone(),
            resumed_from: start,
            entries,
            totals,
            ledger_writes,
        })
    }

    /// Applies a manual decision. `AcceptImported` overwrites the local row
    /// with the imported values and fails with
    /// [`LedgerError::VersionConflict`] if the row changed since the conflict
    /// was reported; `KeepLocal` leaves the row untouched.
    pub fn resolve_conflict(
        &self,
        store: &LedgerStore,
        conflict: &ReconcileConflict,
        resolution: Resolution,
    ) -> Result<Transaction> {
        match resolution {
            Resolution::KeepLocal => {
                let current = store.get(conflict.transaction_id)?;
                info!(transaction = %current.id, "conflict resolved: kept local copy");
                Ok(current)
            }
            Resolution::AcceptImported => {
                let updated = store.edit_with(
                    conflict.transaction_id,
                    conflict.record.patch(),
                    conflict.local_version,
                    EditOrigin::Import,
                )?;
                info!(transaction = %updated.id, version = updated.version, "conflict resolved: accepted import");
                Ok(updated)
            }
        }
    }

    pub fn checkpoint(&self, store: &LedgerStore, batch_id: &str) -> Result<Option<BatchCheckpoint>> {
        checkpoint::load(store.queue(), batch_id)
    }

    fn validate(&self, store: &LedgerStore, batch: &ImportBatch) -> Result<()> {
        if batch.id.trim().is_empty() {
            return Err(invalid("import batch id cannot be empty"));
        }
        let mut seen: HashMap<(Uuid, &str), usize> = HashMap::new();
        for (index, record) in batch.records.iter().enumerate() {
            let account = store.account(record.account_id)?;
            if account.archived {
                return Err(LedgerError::AccountArchived(account.id));
            }
            if record.currency() != &account.currency {
                return Err(LedgerError::CurrencyMismatch {
                    entity: format!("import record {index} of batch {}", batch.id),
                    expected: account.currency.clone(),
                    found: record.currency().clone(),
                });
            }
            if let Some(external_id) = &record.external_id {
                if external_id.trim().is_empty() {
                    return Err(invalid(format!("import record {index} has a blank external id")));
                }
                let key = (record.account_id, external_id.as_str());
                if let Some(first) = seen.insert(key, index) {
                    return Err(invalid(format!(
                        "import records {first} and {index} share external id `{external_id}`"
                    )));
                }
            }
        }
        Ok(())
    }

    fn find_match(&self, store: &LedgerStore, record: &ImportRecord, claimed: &HashSet<Uuid>) -> Option<Transaction> {
        if let Some(external_id) = &record.external_id {
            return store.find_by_external_id(record.account_id, external_id);
        }
        let candidates: Vec<Transaction> = store
            .list_by_account(record.account_id, self.matcher.window(record.timestamp))
            .ok()?
            .including_deleted()
            .collect();
        self.matcher.best(record, &candidates, claimed).cloned()
    }

    fn reconcile_record(
        &self,
        store: &LedgerStore,
        rules: &RuleSet,
        batch: &ImportBatch,
        index: usize,
        insert_id: Uuid,
        claimed: &HashSet<Uuid>,
    ) -> Result<(ReconcileOutcome, bool)> {
        let record = &batch.records[index];
        // A row this record inserted on an earlier run counts as its match
        // even when local edits moved it out of the fingerprint window.
        let earlier = || store.get(insert_id).ok().filter(|txn| !claimed.contains(&txn.id));
        let Some(existing) = self.find_match(store, record, claimed).or_else(earlier) else {
            let mut draft = NewTransaction::new(record.account_id, record.amount.clone(), record.timestamp)
                .with_id(insert_id)
                .with_memo(record.memo.clone())
                .imported();
            if let Some(external_id) = &record.external_id {
                draft = draft.with_external_id(external_id.clone());
            }
            draft.category_id = rules.categorize(&TransactionFacts::from(&draft));
            let txn = store.append(draft)?;
            debug!(batch = %batch.id, index, transaction = %txn.id, "import record inserted");
            return Ok((ReconcileOutcome::Inserted { transaction_id: txn.id }, true));
        };

        let matched = |refreshed| ReconcileOutcome::Matched {
            transaction_id: existing.id,
            refreshed,
        };
        // A tombstoned match keeps a deleted import deleted.
        if existing.deleted {
            debug!(batch = %batch.id, index, transaction = %existing.id, "import record matches a deleted row");
            return Ok((matched(false), false));
        }
        let differences = differences(&existing, record);
        if differences.is_empty() {
            debug!(batch = %batch.id, index, transaction = %existing.id, "import record matched");
            return Ok((matched(false), false));
        }
        if existing.manually_edited() {
            warn!(batch = %batch.id, index, transaction = %existing.id, "import conflicts with a local edit");
            return Ok((
                ReconcileOutcome::Conflicted(ReconcileConflict {
                    batch_id: batch.id.clone(),
                    index,
                    record: record.clone(),
                    transaction_id: existing.id,
                    local_version: existing.version,
                    differences,
                }),
                false,
            ));
        }
        store.edit_with(existing.id, record.patch(), existing.version, EditOrigin::Import)?;
        debug!(batch = %batch.id, index, transaction = %existing.id, "unedited row refreshed from import");
        Ok((matched(true), true))
    }
}

/// Id given to the row inserted for `batch.records[index]`.
///
/// Derived from the batch, the position and the record itself, so a rerun
/// after a write whose acknowledgement was lost addresses the same row.
fn insert_id_for(batch: &ImportBatch, index: usize) -> Uuid {
    let record = &batch.records[index];
    let name = format!(
        "{}\u{1f}{index}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        batch.id,
        record.account_id,
        record.amount,
        record.timestamp.to_rfc3339(),
        record.external_id.as_deref().unwrap_or_default(),
        record.memo,
    );
    Uuid::new_v5(&IMPORT_NAMESPACE, name.as_bytes())
}

fn differences(local: &Transaction, record: &ImportRecord) -> Vec<FieldDifference> {
    let mut found = Vec::new();
    if local.amount != record.amount {
        found.push(FieldDifference {
            field: ConflictField::Amount,
            local: local.amount.to_string(),
            imported: record.amount.to_string(),
        });
    }
    if local.timestamp != record.timestamp {
        found.push(FieldDifference {
            field: ConflictField::Timestamp,
            local: local.timestamp.to_rfc3339(),
            imported: record.timestamp.to_rfc3339(),
        });
    }
    if local.memo != record.memo {
        found.push(FieldDifference {
            field: ConflictField::Memo,
            local: local.memo.clone(),
            imported: record.memo.clone(),
        });
    }
    found
}

struct RunGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    batch: String,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a Mutex<HashSet<String>>, batch: &str) -> Result<Self> {
        if !lock(running).insert(batch.to_string()) {
            return Err(LedgerError::BatchInProgress(batch.to_string()));
        }
        Ok(Self {
            running,
            batch: batch.to_string(),
        })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock(self.running).remove(&self.batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::ledger::{Account, AccountKind};
    use crate::storage::{MemoryStorage, RecordKind};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(ReconcileSettings::default(), RetryPolicy::no_retry())
    }

    fn setup() -> (LedgerStore, Arc<MemoryStorage>, Account) {
        let backend = Arc::new(MemoryStorage::new());
        let store = LedgerStore::open(backend.clone(), &StorageSettings::default()).unwrap();
        let account = store
            .open_account("Checking", AccountKind::Bank, Money::zero("USD"))
            .unwrap();
        (store, backend, account)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, day, 8, 0, 0).unwrap()
    }

    fn usd(minor: i64) -> Money {
        Money::from_minor(minor, "USD")
    }

    #[test]
    fn run_guard_blocks_concurrent_runs_of_one_batch() {
        let running = Mutex::new(HashSet::new());
        let guard = RunGuard::acquire(&running, "b1").unwrap();
        assert!(matches!(
            RunGuard::acquire(&running, "b1"),
            Err(LedgerError::BatchInProgress(_))
        ));
        assert!(RunGuard::acquire(&running, "b2").is_ok());
        drop(guard);
        assert!(RunGuard::acquire(&running, "b1").is_ok());
    }

    #[test]
    fn duplicate_fingerprints_in_one_batch_insert_twice() {
        let (store, backend, account) = setup();
        let coffee = ImportRecord::new(account.id, usd(-450), at(3)).with_memo("Coffee");
        let batch = ImportBatch::new("coffee", vec![coffee.clone(), coffee]);
        let report = engine().run(&store, &RuleSet::default(), &batch).unwrap();
        assert_eq!(report.count(RecordState::Inserted), 2);

        let rerun = engine().run(&store, &RuleSet::default(), &batch).unwrap();
        assert_eq!(rerun.count(RecordState::Matched), 2);
        assert_eq!(rerun.ledger_writes, 0);
        assert_eq!(backend.save_count(RecordKind::Transaction), 2);
    }

    #[test]
    fn unedited_rows_are_refreshed_and_edited_rows_conflict() {
        let (store, _, account) = setup();
        let original = ImportRecord::new(account.id, usd(-1_000), at(4))
            .with_external_id("T-1")
            .with_memo("Gym");
        engine()
            .run(&store, &RuleSet::default(), &ImportBatch::new("a", vec![original.clone()]))
            .unwrap();

        let corrected = original.clone().with_memo("Gym membership");
        let report = engine()
            .run(&store, &RuleSet::default(), &ImportBatch::new("b", vec![corrected]))
            .unwrap();
        assert!(matches!(
            report.entries[0].outcome,
            ReconcileOutcome::Matched { refreshed: true, .. }
        ));
        let txn = store.find_by_external_id(account.id, "T-1").unwrap();
        assert_eq!(txn.memo, "Gym membership");
        assert!(!txn.manually_edited());

        store
            .edit(txn.id, TransactionPatch::new().memo("Gym (annual)"), txn.version)
            .unwrap();
        let again = ImportRecord::new(account.id, usd(-1_200), at(4))
            .with_external_id("T-1")
            .with_memo("Gym membership");
        let report = engine()
            .run(&store, &RuleSet::default(), &ImportBatch::new("c", vec![again]))
            .unwrap();
        let conflicts = report.conflicts();
        assert_eq!(conflicts.len(), 1);
        let fields: Vec<ConflictField> = conflicts[0].differences.iter().map(|d| d.field).collect();
        assert_eq!(fields, vec![ConflictField::Amount, ConflictField::Memo]);
        assert_eq!(store.get(txn.id).unwrap().memo, "Gym (annual)");
    }

    #[test]
    fn validation_rejects_foreign_currency_before_writing() {
        let (store, backend, account) = setup();
        let batch = ImportBatch::new(
            "mixed",
            vec![
                ImportRecord::new(account.id, usd(-1), at(1)),
                ImportRecord::new(account.id, Money::from_minor(-1, "EUR"), at(1)),
            ],
        );
        let err = engine().run(&store, &RuleSet::default(), &batch).unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
        assert_eq!(backend.save_count(RecordKind::Transaction), 0);
    }

    #[test]
    fn insert_ids_depend_on_batch_position_and_content() {
        let (_, _, account) = setup();
        let record = ImportRecord::new(account.id, usd(-300), at(2)).with_external_id("S1");
        let batch = ImportBatch::new("slow", vec![record.clone(), record.clone().with_external_id("S2")]);

        assert_eq!(insert_id_for(&batch, 0), insert_id_for(&batch.clone(), 0));
        assert_ne!(insert_id_for(&batch, 0), insert_id_for(&batch, 1));
        let renamed = ImportBatch::new("slow-2", batch.records.clone());
        assert_ne!(insert_id_for(&batch, 0), insert_id_for(&renamed, 0));
        let changed = ImportBatch::new("slow", vec![record.with_memo("edited")]);
        assert_ne!(insert_id_for(&batch, 0), insert_id_for(&changed, 0));
    }

    #[test]
    fn repeated_external_id_within_a_batch_is_rejected() {
        let (store, backend, account) = setup();
        let batch = ImportBatch::new(
            "twice",
            vec![
                ImportRecord::new(account.id, usd(-100), at(1)).with_external_id("X1"),
                ImportRecord::new(account.id, usd(-200), at(2)).with_external_id("X1"),
            ],
        );
        let err = engine().run(&store, &RuleSet::default(), &batch).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(ref msg) if msg.contains("X1")));
        assert_eq!(backend.save_count(RecordKind::Transaction), 0);
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn rerun_finds_its_own_row_after_a_local_amount_edit() {
        let (store, backend, account) = setup();
        let batch = ImportBatch::new(
            "cash",
            vec![ImportRecord::new(account.id, usd(-2_000), at(6)).with_memo("Plumber")],
        );
        let first = engine().run(&store, &RuleSet::default(), &batch).unwrap();
        let id = first.entries[0].outcome.transaction_id();
        store
            .edit(id, TransactionPatch::new().amount(usd(-2_500)), 1)
            .unwrap();
        let writes = backend.save_count(RecordKind::Transaction);

        let rerun = engine().run(&store, &RuleSet::default(), &batch).unwrap();
        assert_eq!(rerun.count(RecordState::Conflicted), 1);
        assert_eq!(rerun.conflicts()[0].transaction_id, id);
        assert_eq!(backend.save_count(RecordKind::Transaction), writes);
        assert_eq!(store.transaction_count(), 1);
    }
}
