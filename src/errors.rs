use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::currency::CurrencyCode;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error type that captures ledger, balance, budget, and reconciliation failures.
///
/// Messages name the failure kind and the entity involved; storage internals are
/// only reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Duplicate external id `{external_id}` in account {account_id} (transaction {existing})")]
    DuplicateExternalId {
        account_id: Uuid,
        external_id: String,
        existing: Uuid,
    },
    #[error("Version conflict on {entity}: expected version {expected}, found {actual}")]
    VersionConflict {
        entity: Uuid,
        expected: u64,
        actual: u64,
    },
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },
    #[error("Persistence error ({kind}) on {entity}")]
    Persistence {
        entity: String,
        kind: PersistenceKind,
        #[source]
        source: StorageError,
    },
    #[error("Currency mismatch on {entity}: expected {expected}, found {found}")]
    CurrencyMismatch {
        entity: String,
        expected: CurrencyCode,
        found: CurrencyCode,
    },
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("Account archived: {0}")]
    AccountArchived(Uuid),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),
    #[error("Transaction deleted: {0}")]
    TransactionDeleted(Uuid),
    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),
    #[error("Category {category} cannot be placed under {parent}: the tree would contain a cycle")]
    CategoryCycle { category: Uuid, parent: Uuid },
    #[error("Name `{0}` already exists")]
    DuplicateName(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Import batch `{batch}` interrupted after {processed} records")]
    BatchInterrupted {
        batch: String,
        processed: usize,
        #[source]
        source: Box<LedgerError>,
    },
    #[error("Import batch `{0}` is already running")]
    BatchInProgress(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Wraps a storage failure for the given entity.
    pub fn persistence(entity: impl fmt::Display, source: StorageError) -> Self {
        LedgerError::Persistence {
            entity: entity.to_string(),
            kind: PersistenceKind::from(&source),
            source,
        }
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        LedgerError::AmountOverflow {
            context: context.into(),
        }
    }

    /// Returns `true` when retrying the same call (after a re-read for version
    /// conflicts) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Persistence { .. } | LedgerError::VersionConflict { .. }
        )
    }
}

/// Coarse classification of storage failures that is safe to show to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceKind {
    Timeout,
    Unavailable,
    Corrupt,
    Io,
}

impl From<&StorageError> for PersistenceKind {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::Timeout(_) => PersistenceKind::Timeout,
            StorageError::Unavailable(_) => PersistenceKind::Unavailable,
            StorageError::Corrupt(_) | StorageError::Serde(_) => PersistenceKind::Corrupt,
            StorageError::Io(_) => PersistenceKind::Io,
        }
    }
}

impl fmt::Display for PersistenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PersistenceKind::Timeout => "timeout",
            PersistenceKind::Unavailable => "unavailable",
            PersistenceKind::Corrupt => "corrupt record",
            PersistenceKind::Io => "io",
        };
        f.write_str(label)
    }
}
