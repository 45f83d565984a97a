use super::{Account, Category, Transaction};

/// Committed change, published after the record is durable and the store
/// state has been swapped.
#[derive(Debug, Clone)]
pub enum LedgerChange {
    AccountOpened(Account),
    AccountUpdated(Account),
    TransactionAppended(Transaction),
    TransactionEdited {
        before: Transaction,
        after: Transaction,
    },
    /// Carries the tombstoned row.
    TransactionDeleted(Transaction),
    CategoryChanged {
        before: Option<Category>,
        after: Category,
    },
}

/// Derived caches subscribe through this trait. Calls happen inside the
/// account's write gate, so implementations must not call back into the
/// store's mutating methods.
pub trait LedgerObserver: Send + Sync {
    fn on_change(&self, change: &LedgerChange);
}
