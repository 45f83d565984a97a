//! Running and as-of balances backed by an ordered per-account index and an
//! invalidating snapshot cache.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SnapshotPolicy;
use crate::currency::{CurrencyCode, Money};
use crate::errors::{LedgerError, Result};
use crate::ledger::{Account, LedgerChange, LedgerObserver, LedgerStore, TimeRange, Transaction};
use crate::utils::{read_lock, write_lock};

type OrderKey = (DateTime<Utc>, Uuid);

const MAX_ID: Uuid = Uuid::from_u128(u128::MAX);

/// Balance after one transaction, as produced by
/// [`BalanceEngine::running_balances`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningBalance {
    pub transaction_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub amount: Money,
    pub balance: Money,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceStats {
    pub snapshot_hits: u64,
    pub snapshot_misses: u64,
    pub snapshots: usize,
}

struct AccountBook {
    currency: CurrencyCode,
    opening: i64,
    entries: BTreeMap<OrderKey, i64>,
    /// as-of time -> opening + every entry at or before it.
    snapshots: BTreeMap<DateTime<Utc>, i64>,
    generation: u64,
}

impl AccountBook {
    fn new(account: &Account) -> Self {
        Self {
            currency: account.currency.clone(),
            opening: account.opening_balance.minor(),
            entries: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            generation: 0,
        }
    }

    fn put(&mut self, txn: &Transaction) {
        if txn.is_live() {
            self.entries
                .insert(txn.order_key(), txn.settled_amount().minor());
        }
    }

    /// Drops every snapshot at or after `from`; earlier ones stay valid.
    fn invalidate_from(&mut self, from: DateTime<Utc>) {
        let dropped = self.snapshots.split_off(&from);
        self.generation += 1;
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), %from, "balance snapshots invalidated");
        }
    }

    fn sum_from(
        &self,
        start: Option<(DateTime<Utc>, i64)>,
        upper: Bound<OrderKey>,
    ) -> Result<(i64, usize)> {
        let (lower, mut total) = match start {
            Some((at, value)) => (Bound::Excluded((at, MAX_ID)), value),
            None => (Bound::Unbounded, self.opening),
        };
        let mut scanned = 0;
        for amount in self.entries.range((lower, upper)).map(|(_, amount)| *amount) {
            total = total
                .checked_add(amount)
                .ok_or_else(|| LedgerError::overflow("account balance"))?;
            scanned += 1;
        }
        Ok((total, scanned))
    }
}

/// Derived balance cache. Subscribe it to the [`LedgerStore`] and call
/// [`BalanceEngine::hydrate`] once at start-up.
pub struct BalanceEngine {
    policy: SnapshotPolicy,
    books: RwLock<HashMap<Uuid, Arc<RwLock<AccountBook>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BalanceEngine {
    pub fn new(policy: SnapshotPolicy) -> Self {
        Self {
            policy,
            books: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Rebuilds every account index from the store's committed state.
    pub fn hydrate(&self, store: &LedgerStore) -> Result<()> {
        let mut books = HashMap::new();
        for account in store.accounts() {
            let mut book = AccountBook::new(&account);
            for txn in store.list_by_account(account.id, TimeRange::all())? {
                book.put(&txn);
            }
            books.insert(account.id, Arc::new(RwLock::new(book)));
        }
        debug!(accounts = books.len(), "balance engine hydrated");
        *write_lock(&self.books) = books;
        Ok(())
    }

    /// Opening balance plus every live settled amount with timestamp `<= at`.
    pub fn balance_as_of(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<Money> {
        let book = self.book(account_id)?;
        let (total, scanned, generation, currency) = {
            let book = read_lock(&book);
            let start = book
                .snapshots
                .range(..=at)
                .next_back()
                .map(|(time, value)| (*time, *value));
            self.count_lookup(start.is_some());
            let (total, scanned) = book.sum_from(start, Bound::Included((at, MAX_ID)))?;
            (total, scanned, book.generation, book.currency.clone())
        };
        if scanned >= self.policy.interval && self.policy.max_per_account > 0 {
            self.record_snapshot(&book, at, total, generation);
        }
        Ok(Money::from_minor(total, currency))
    }

    /// Balance from everything strictly before `at`.
    pub fn balance_before(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<Money> {
        let book = self.book(account_id)?;
        let book = read_lock(&book);
        let start = book
            .snapshots
            .range(..at)
            .next_back()
            .map(|(time, value)| (*time, *value));
        self.count_lookup(start.is_some());
        let (total, _) = book.sum_from(start, Bound::Excluded((at, Uuid::nil())))?;
        Ok(Money::from_minor(total, book.currency.clone()))
    }

    /// Balance including every live transaction.
    pub fn closing_balance(&self, account_id: Uuid) -> Result<Money> {
        let book = self.book(account_id)?;
        let book = read_lock(&book);
        let start = book
            .snapshots
            .iter()
            .next_back()
            .map(|(time, value)| (*time, *value));
        let (total, _) = book.sum_from(start, Bound::Unbounded)?;
        Ok(Money::from_minor(total, book.currency.clone()))
    }

    /// Per-transaction running totals for the rows inside `range`.
    pub fn running_balances(&self, account_id: Uuid, range: TimeRange) -> Result<Vec<RunningBalance>> {
        if range.is_empty() {
            self.book(account_id)?;
            return Ok(Vec::new());
        }
        let book = self.book(account_id)?;
        let book = read_lock(&book);
        let (mut total, lower) = match range.start {
            Some(start) => {
                let snapshot = book
                    .snapshots
                    .range(..start)
                    .next_back()
                    .map(|(time, value)| (*time, *value));
                let lower = (start, Uuid::nil());
                (book.sum_from(snapshot, Bound::Excluded(lower))?.0, Bound::Included(lower))
            }
            None => (book.opening, Bound::Unbounded),
        };
        let upper = match range.end {
            Some(end) => Bound::Excluded((end, Uuid::nil())),
            None => Bound::Unbounded,
        };
        let mut rows = Vec::new();
        for ((timestamp, id), amount) in book.entries.range((lower, upper)) {
            total = total
                .checked_add(*amount)
                .ok_or_else(|| LedgerError::overflow("running balance"))?;
            rows.push(RunningBalance {
                transaction_id: *id,
                timestamp: *timestamp,
                amount: Money::from_minor(*amount, book.currency.clone()),
                balance: Money::from_minor(total, book.currency.clone()),
            });
        }
        Ok(rows)
    }

    pub fn snapshot_times(&self, account_id: Uuid) -> Result<Vec<DateTime<Utc>>> {
        let book = self.book(account_id)?;
        let times = read_lock(&book).snapshots.keys().copied().collect();
        Ok(times)
    }

    pub fn stats(&self) -> BalanceStats {
        let snapshots = read_lock(&self.books)
            .values()
            .map(|book| read_lock(book).snapshots.len())
            .sum();
        BalanceStats {
            snapshot_hits: self.hits.load(Ordering::Relaxed),
            snapshot_misses: self.misses.load(Ordering::Relaxed),
            snapshots,
        }
    }

    fn book(&self, account_id: Uuid) -> Result<Arc<RwLock<AccountBook>>> {
        read_lock(&self.books)
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    fn count_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_snapshot(&self, book: &RwLock<AccountBook>, at: DateTime<Utc>, total: i64, generation: u64) {
        let mut book = write_lock(book);
        // A mutation landed after the scan; the total may already be stale.
        if book.generation != generation {
            return;
        }
        book.snapshots.insert(at, total);
        while book.snapshots.len() > self.policy.max_per_account {
            book.snapshots.pop_first();
        }
    }

    fn with_book(&self, account_id: Uuid, apply: impl FnOnce(&mut AccountBook)) {
        match self.book(account_id) {
            Ok(book) => apply(&mut write_lock(&book)),
            Err(_) => warn!(account = %account_id, "balance change for unknown account ignored"),
        }
    }
}

impl LedgerObserver for BalanceEngine {
    fn on_change(&self, change: &LedgerChange) {
        match change {
            LedgerChange::AccountOpened(account) => {
                write_lock(&self.books)
                    .entry(account.id)
                    .or_insert_with(|| Arc::new(RwLock::new(AccountBook::new(account))));
            }
            LedgerChange::AccountUpdated(_) | LedgerChange::CategoryChanged { .. } => {}
            LedgerChange::TransactionAppended(txn) => self.with_book(txn.account_id, |book| {
                book.put(txn);
                book.invalidate_from(txn.timestamp);
            }),
            LedgerChange::TransactionEdited { before, after } => {
                self.with_book(after.account_id, |book| {
                    book.entries.remove(&before.order_key());
                    book.put(after);
                    book.invalidate_from(before.timestamp.min(after.timestamp));
                })
            }
            LedgerChange::TransactionDeleted(txn) => self.with_book(txn.account_id, |book| {
                book.entries.remove(&txn.order_key());
                book.invalidate_from(txn.timestamp);
            }),
        }
    }
}
