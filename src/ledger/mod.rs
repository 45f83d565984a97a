//! Ledger domain models and the durable ledger store.

pub mod account;
pub mod category;
pub mod observer;
pub mod period;
pub mod range;
pub mod store;
pub mod transaction;

pub use account::{Account, AccountKind};
pub use category::{BudgetRule, Category, CategoryTree};
pub use observer::{LedgerChange, LedgerObserver};
pub use period::{BudgetPeriod, PeriodKey};
pub use range::{day_start, TimeRange};
pub use store::{LedgerStore, TransactionCursor};
pub use transaction::{Conversion, EditOrigin, NewTransaction, Transaction, TransactionPatch};
