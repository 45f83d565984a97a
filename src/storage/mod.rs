//! Persistence boundary: generic records saved through an injected backend.

pub mod json_backend;
pub mod memory;
pub mod worker;

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub use json_backend::JsonFileStorage;
pub use memory::MemoryStorage;
pub use worker::PersistenceQueue;

/// Failures raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Entity families stored by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Account,
    Transaction,
    Category,
    Checkpoint,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Account => "account",
            RecordKind::Transaction => "transaction",
            RecordKind::Category => "category",
            RecordKind::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-level envelope: `{id, type, fields..., version, tombstone}`.
///
/// `partition` and `sort_key` let backends answer range queries without
/// understanding `fields` (transactions use the account id and timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<DateTime<Utc>>,
    pub fields: serde_json::Value,
    pub version: u64,
    #[serde(default)]
    pub tombstone: bool,
}

impl Record {
    pub fn encode<T: Serialize>(
        kind: RecordKind,
        id: impl Into<String>,
        entity: &T,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            id: id.into(),
            kind,
            partition: None,
            sort_key: None,
            fields: serde_json::to_value(entity)?,
            version: 1,
            tombstone: false,
        })
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_sort_key(mut self, sort_key: DateTime<Utc>) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    pub fn with_version(mut self, version: u64, tombstone: bool) -> Self {
        self.version = version;
        self.tombstone = tombstone;
        self
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_json::from_value(self.fields.clone())
            .map_err(|err| StorageError::Corrupt(format!("{} {}: {}", self.kind, self.id, err)))
    }
}

/// Range query over one record kind. `start` is inclusive, `end` exclusive;
/// records without a sort key only match unbounded queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub kind: RecordKind,
    pub partition: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RecordQuery {
    pub fn all(kind: RecordKind) -> Self {
        Self {
            kind,
            partition: None,
            start: None,
            end: None,
        }
    }

    pub fn in_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if record.kind != self.kind {
            return false;
        }
        if let Some(partition) = &self.partition {
            if record.partition.as_ref() != Some(partition) {
                return false;
            }
        }
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        let Some(key) = record.sort_key else {
            return false;
        };
        self.start.map_or(true, |start| key >= start) && self.end.map_or(true, |end| key < end)
    }
}

/// Orders query results by `(sort_key, id)`, unkeyed records first.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| (a.sort_key, &a.id).cmp(&(b.sort_key, &b.id)));
}

/// Abstraction over persistence collaborators (local file store, remote database).
///
/// `save_record` must be durable when it returns `Ok` and must replace any
/// previous record with the same kind and id.
pub trait StorageBackend: Send + Sync {
    fn save_record(&self, record: &Record) -> Result<(), StorageError>;
    fn load_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError>;
    fn query_range(&self, query: &RecordQuery) -> Result<Vec<Record>, StorageError>;
}
