#![doc(test(attr(deny(warnings))))]

//! Transaction ledger and reconciliation engine for a personal money manager:
//! durable accounts and transactions, running balances, categorization and
//! budgets, idempotent imports, and read-only reports.

pub mod balance;
pub mod budget;
pub mod cli;
pub mod config;
pub mod core;
pub mod currency;
pub mod errors;
pub mod ledger;
pub mod reconcile;
pub mod reporting;
pub mod storage;
pub mod utils;

pub use crate::core::LedgerManager;
pub use config::LedgerConfig;
pub use currency::{CurrencyCode, Money};
pub use errors::{LedgerError, Result};

/// Initializes global tracing with the default log filter (`RUST_LOG`
/// overrides it) and emits a startup log. Embedders that load a
/// [`LedgerConfig`] can call [`utils::init_tracing`] with its `log_filter`
/// instead.
pub fn init() {
    utils::init_tracing(&LedgerConfig::default().log_filter);
}
