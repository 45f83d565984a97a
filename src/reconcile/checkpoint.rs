use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReconcileOutcome;
use crate::errors::{LedgerError, Result};
use crate::storage::{PersistenceQueue, Record, RecordKind};

/// Per-outcome counters, cumulative across resumed runs of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub matched: usize,
    pub refreshed: usize,
    pub inserted: usize,
    pub conflicted: usize,
}

impl BatchTotals {
    pub fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Matched { refreshed, .. } => {
                self.matched += 1;
                if *refreshed {
                    self.refreshed += 1;
                }
            }
            ReconcileOutcome::Inserted { .. } => self.inserted += 1,
            ReconcileOutcome::Conflicted(_) => self.conflicted += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.matched + self.inserted + self.conflicted
    }
}

/// Resume point of an import batch, stored as a `checkpoint` record keyed by
/// the batch id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub batch_id: String,
    /// Index of the next record to process.
    pub next_index: usize,
    pub total: usize,
    pub totals: BatchTotals,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl BatchCheckpoint {
    pub fn new(batch_id: &str, next_index: usize, total: usize, totals: BatchTotals) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            next_index,
            total,
            totals,
            completed: next_index >= total,
            updated_at: Utc::now(),
        }
    }
}

pub(crate) fn load(queue: &PersistenceQueue, batch_id: &str) -> Result<Option<BatchCheckpoint>> {
    let entity = format!("checkpoint {batch_id}");
    let record = queue
        .load_record(RecordKind::Checkpoint, batch_id)
        .map_err(|err| LedgerError::persistence(&entity, err))?;
    record
        .map(|record| record.decode().map_err(|err| LedgerError::persistence(&entity, err)))
        .transpose()
}

pub(crate) fn save(queue: &PersistenceQueue, checkpoint: &BatchCheckpoint) -> Result<()> {
    let entity = format!("checkpoint {}", checkpoint.batch_id);
    let record = Record::encode(RecordKind::Checkpoint, checkpoint.batch_id.clone(), checkpoint)
        .map_err(|err| LedgerError::persistence(&entity, err))?
        .with_sort_key(checkpoint.updated_at);
    queue
        .save_record(record)
        .map_err(|err| LedgerError::persistence(&entity, err))
}
