use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, RwLock},
    thread,
    time::Duration,
};

use super::{sort_records, Record, RecordKind, RecordQuery, StorageBackend, StorageError};
use crate::utils::{lock, read_lock, write_lock};

/// In-process storage used by tests and ephemeral ledgers.
///
/// Supports fault and latency injection so callers can exercise timeout,
/// retry, and resume paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<BTreeMap<(RecordKind, String), Record>>,
    faults: Mutex<FaultPlan>,
    saves: Mutex<HashMap<RecordKind, usize>>,
}

#[derive(Debug, Default)]
struct FaultPlan {
    fail_next: usize,
    allow_before_failing: Option<usize>,
    save_delay: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` saves fail with [`StorageError::Unavailable`].
    pub fn fail_next_saves(&self, count: usize) {
        lock(&self.faults).fail_next = count;
    }

    /// Lets `successful` more saves through, then fails every save until
    /// [`MemoryStorage::clear_faults`] is called.
    pub fn fail_saves_after(&self, successful: usize) {
        lock(&self.faults).allow_before_failing = Some(successful);
    }

    /// Delays every save, simulating a slow or hung remote store.
    pub fn set_save_delay(&self, delay: Option<Duration>) {
        lock(&self.faults).save_delay = delay;
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = FaultPlan::default();
    }

    /// Number of successful saves for `kind` since creation.
    pub fn save_count(&self, kind: RecordKind) -> usize {
        lock(&self.saves).get(&kind).copied().unwrap_or(0)
    }

    pub fn record_count(&self, kind: RecordKind) -> usize {
        read_lock(&self.records)
            .keys()
            .filter(|(stored, _)| *stored == kind)
            .count()
    }

    fn check_faults(&self) -> Result<(), StorageError> {
        let delay = {
            let mut plan = lock(&self.faults);
            if plan.fail_next > 0 {
                plan.fail_next -= 1;
                return Err(StorageError::Unavailable("injected save failure".into()));
            }
            if let Some(remaining) = plan.allow_before_failing.as_mut() {
                if *remaining == 0 {
                    return Err(StorageError::Unavailable("injected outage".into()));
                }
                *remaining -= 1;
            }
            plan.save_delay
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    fn save_record(&self, record: &Record) -> Result<(), StorageError> {
        self.check_faults()?;
        write_lock(&self.records).insert((record.kind, record.id.clone()), record.clone());
        *lock(&self.saves).entry(record.kind).or_default() += 1;
        Ok(())
    }

    fn load_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        Ok(read_lock(&self.records).get(&(kind, id.to_string())).cloned())
    }

    fn query_range(&self, query: &RecordQuery) -> Result<Vec<Record>, StorageError> {
        let mut records: Vec<Record> = read_lock(&self.records)
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        sort_records(&mut records);
        Ok(records)
    }
}
