//! Rule-based categorization and per-period budget consumption.

pub mod rules;

use std::{collections::HashMap, sync::RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::currency::{CurrencyCode, Money};
use crate::errors::{LedgerError, Result};
use crate::ledger::{Category, LedgerChange, LedgerObserver, LedgerStore, PeriodKey};
use crate::utils::{read_lock, write_lock};

pub use rules::{AmountRange, CategorizationRule, MemoPattern, RuleSet, TransactionFacts};

/// Derived consumption of one category in one period. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub category_id: Uuid,
    pub period: PeriodKey,
    /// Limit of the category's rule when the rule uses this period kind.
    pub limit: Option<Money>,
    /// Spending is positive; refunds reduce it.
    pub consumed: Money,
    pub transaction_count: usize,
    /// Rows skipped because they settle in another currency.
    pub excluded_foreign: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetStatus {
    pub category_id: Uuid,
    pub name: String,
    pub period: PeriodKey,
    pub limit: Money,
    pub consumed: Money,
    pub remaining: Money,
    pub over_budget: bool,
    pub excluded_foreign: usize,
}

#[derive(Default)]
struct BudgetCache {
    entries: HashMap<(Uuid, PeriodKey), BudgetSnapshot>,
    // Bumped on every invalidation touching the category; results computed
    // across a bump are not cached.
    epochs: HashMap<Uuid, u64>,
}

impl BudgetCache {
    fn epoch(&self, category: Uuid) -> u64 {
        self.epochs.get(&category).copied().unwrap_or(0)
    }

    fn invalidate_at(&mut self, category: Uuid, at: DateTime<Utc>) {
        self.entries
            .retain(|(id, period), _| !(*id == category && period.contains(at)));
        *self.epochs.entry(category).or_default() += 1;
    }

    fn invalidate_category(&mut self, category: Uuid) {
        self.entries.retain(|(id, _), _| *id != category);
        *self.epochs.entry(category).or_default() += 1;
    }
}

pub struct BudgetEngine {
    base_currency: CurrencyCode,
    rules: RwLock<RuleSet>,
    cache: RwLock<BudgetCache>,
}

impl BudgetEngine {
    /// `base_currency` applies to categories without a budget rule.
    pub fn new(base_currency: CurrencyCode) -> Self {
        Self {
            base_currency,
            rules: RwLock::new(RuleSet::default()),
            cache: RwLock::new(BudgetCache::default()),
        }
    }

    pub fn rules(&self) -> RuleSet {
        read_lock(&self.rules).clone()
    }

    pub fn set_rules(&self, store: &LedgerStore, rules: Vec<CategorizationRule>) -> Result<()> {
        for rule in &rules {
            store.category(rule.category_id)?;
        }
        *write_lock(&self.rules) = RuleSet::new(rules);
        Ok(())
    }

    pub fn push_rule(&self, store: &LedgerStore, rule: CategorizationRule) -> Result<()> {
        store.category(rule.category_id)?;
        write_lock(&self.rules).push(rule);
        Ok(())
    }

    pub fn categorize(&self, facts: &TransactionFacts<'_>) -> Option<Uuid> {
        read_lock(&self.rules).categorize(facts)
    }

    /// Consumption of `category_id` in `period`, served from the cache when a
    /// valid snapshot exists and recomputed from the ledger otherwise.
    pub fn budget_consumed(
        &self,
        store: &LedgerStore,
        category_id: Uuid,
        period: PeriodKey,
    ) -> Result<BudgetSnapshot> {
        let category = store.category(category_id)?;
        let epoch = {
            let cache = read_lock(&self.cache);
            if let Some(hit) = cache.entries.get(&(category_id, period)) {
                return Ok(hit.clone());
            }
            cache.epoch(category_id)
        };

        let snapshot = self.compute(store, &category, period)?;
        let mut cache = write_lock(&self.cache);
        if cache.epoch(category_id) == epoch {
            cache
                .entries
                .insert((category_id, period), snapshot.clone());
        }
        Ok(snapshot)
    }

    pub fn cached(&self, category_id: Uuid, period: PeriodKey) -> Option<BudgetSnapshot> {
        read_lock(&self.cache)
            .entries
            .get(&(category_id, period))
            .cloned()
    }

    /// Limit, consumption and remaining amount for the period of the
    /// category's rule containing `date`. `None` when the category has no
    /// budget.
    pub fn budget_status(
        &self,
        store: &LedgerStore,
        category_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<BudgetStatus>> {
        let category = store.category(category_id)?;
        let Some(rule) = category.budget else {
            return Ok(None);
        };
        let period = rule.period.key_for(date);
        let snapshot = self.budget_consumed(store, category_id, period)?;
        let remaining = rule.limit.checked_sub(&snapshot.consumed)?;
        Ok(Some(BudgetStatus {
            category_id,
            name: category.name,
            period,
            over_budget: remaining.is_negative(),
            limit: rule.limit,
            consumed: snapshot.consumed,
            remaining,
            excluded_foreign: snapshot.excluded_foreign,
        }))
    }

    pub fn budget_statuses(&self, store: &LedgerStore, date: NaiveDate) -> Result<Vec<BudgetStatus>> {
        let mut statuses = Vec::new();
        for category in store.categories() {
            if let Some(status) = self.budget_status(store, category.id, date)? {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    fn compute(&self, store: &LedgerStore, category: &Category, period: PeriodKey) -> Result<BudgetSnapshot> {
        let currency = category
            .budget
            .as_ref()
            .map(|rule| rule.limit.currency().clone())
            .unwrap_or_else(|| self.base_currency.clone());

        let mut consumed: i64 = 0;
        let mut transaction_count = 0;
        let mut excluded_foreign = 0;
        for txn in store.transactions_for_category(Some(category.id), period.range()) {
            let settled = txn.settled_amount();
            if settled.currency() != &currency {
                excluded_foreign += 1;
                continue;
            }
            consumed = consumed
                .checked_sub(settled.minor())
                .ok_or_else(|| LedgerError::overflow(format!("budget of category {}", category.id)))?;
            transaction_count += 1;
        }
        debug!(
            category = %category.id,
            period = %period,
            consumed,
            excluded_foreign,
            "budget recomputed"
        );
        Ok(BudgetSnapshot {
            category_id: category.id,
            period,
            limit: category
                .budget
                .as_ref()
                .filter(|rule| rule.period == period.period)
                .map(|rule| rule.limit.clone()),
            consumed: Money::from_minor(consumed, currency),
            transaction_count,
            excluded_foreign,
        })
    }
}

impl LedgerObserver for BudgetEngine {
    fn on_change(&self, change: &LedgerChange) {
        match change {
            LedgerChange::TransactionAppended(txn) | LedgerChange::TransactionDeleted(txn) => {
                if let Some(category) = txn.category_id {
                    write_lock(&self.cache).invalidate_at(category, txn.timestamp);
                }
            }
            LedgerChange::TransactionEdited { before, after } => {
                let unchanged = before.category_id == after.category_id
                    && before.timestamp == after.timestamp
                    && before.settled_amount() == after.settled_amount();
                if unchanged {
                    return;
                }
                let mut cache = write_lock(&self.cache);
                for txn in [before, after] {
                    if let Some(category) = txn.category_id {
                        cache.invalidate_at(category, txn.timestamp);
                    }
                }
            }
            LedgerChange::CategoryChanged { before, after } => {
                let budget_changed = before
                    .as_ref()
                    .map_or(true, |previous| previous.budget != after.budget);
                if budget_changed {
                    write_lock(&self.cache).invalidate_category(after.id);
                }
            }
            LedgerChange::AccountOpened(_) | LedgerChange::AccountUpdated(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::ledger::{AccountKind, BudgetPeriod, BudgetRule, Conversion, NewTransaction, TransactionPatch};
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct Fixture {
        store: LedgerStore,
        engine: Arc<BudgetEngine>,
        account: Uuid,
    }

    fn fixture() -> Fixture {
        let store = LedgerStore::open(Arc::new(MemoryStorage::new()), &StorageSettings::default()).unwrap();
        let engine = Arc::new(BudgetEngine::new(CurrencyCode::new("USD")));
        store.subscribe(engine.clone());
        let account = store
            .open_account("Checking", AccountKind::Bank, Money::zero("USD"))
            .unwrap()
            .id;
        Fixture {
            store,
            engine,
            account,
        }
    }

    fn day(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, 10, 0, 0).unwrap()
    }

    fn month(m: u32) -> PeriodKey {
        BudgetPeriod::Monthly.key_for(NaiveDate::from_ymd_opt(2025, m, 1).unwrap())
    }

    fn usd(minor: i64) -> Money {
        Money::from_minor(minor, "USD")
    }

    #[test]
    fn spending_is_positive_and_refunds_reduce_it() {
        let f = fixture();
        let food = f.store.add_category("Food", None).unwrap();
        for minor in [-4_000, -1_000, 500] {
            f.store
                .append(NewTransaction::new(f.account, usd(minor), day(1, 5)).with_category(food.id))
                .unwrap();
        }
        let snapshot = f.engine.budget_consumed(&f.store, food.id, month(1)).unwrap();
        assert_eq!(snapshot.consumed, usd(4_500));
        assert_eq!(snapshot.transaction_count, 3);
        assert!(f.engine.cached(food.id, month(1)).is_some());
    }

    #[test]
    fn recategorizing_invalidates_only_affected_entries() {
        let f = fixture();
        let food = f.store.add_category("Food", None).unwrap();
        let fun = f.store.add_category("Fun", None).unwrap();
        let travel = f.store.add_category("Travel", None).unwrap();
        let txn = f
            .store
            .append(NewTransaction::new(f.account, usd(-100), day(1, 3)).with_category(food.id))
            .unwrap();
        f.store
            .append(NewTransaction::new(f.account, usd(-200), day(2, 3)).with_category(food.id))
            .unwrap();
        for (category, period) in [(food.id, month(1)), (food.id, month(2)), (fun.id, month(1)), (travel.id, month(1))] {
            f.engine.budget_consumed(&f.store, category, period).unwrap();
        }

        f.store
            .edit(txn.id, TransactionPatch::new().category(Some(travel.id)), 1)
            .unwrap();

        assert!(f.engine.cached(food.id, month(1)).is_none());
        assert!(f.engine.cached(travel.id, month(1)).is_none());
        assert!(f.engine.cached(food.id, month(2)).is_some());
        assert!(f.engine.cached(fun.id, month(1)).is_some());
        assert_eq!(
            f.engine.budget_consumed(&f.store, travel.id, month(1)).unwrap().consumed,
            usd(100)
        );
        assert_eq!(
            f.engine.budget_consumed(&f.store, food.id, month(1)).unwrap().consumed,
            usd(0)
        );
    }

    #[test]
    fn foreign_rows_are_excluded_and_counted() {
        let f = fixture();
        let eur_account = f
            .store
            .open_account("Euro", AccountKind::Bank, Money::zero("EUR"))
            .unwrap();
        let travel = f.store.add_category("Travel", None).unwrap();
        f.store
            .append(NewTransaction::new(eur_account.id, Money::from_minor(-900, "EUR"), day(3, 1)).with_category(travel.id))
            .unwrap();
        f.store
            .append(
                NewTransaction::new(f.account, Money::from_minor(-1_000, "EUR"), day(3, 2))
                    .with_category(travel.id)
                    .with_conversion(Conversion::new(usd(-1_100))),
            )
            .unwrap();
        let snapshot = f.engine.budget_consumed(&f.store, travel.id, month(3)).unwrap();
        assert_eq!(snapshot.consumed, usd(1_100));
        assert_eq!(snapshot.excluded_foreign, 1);
    }

    #[test]
    fn status_reports_remaining_and_overrun() {
        let f = fixture();
        let food = f.store.add_category("Food", None).unwrap();
        let food = f
            .store
            .set_category_budget(food.id, Some(BudgetRule::new(usd(10_000), BudgetPeriod::Monthly)), 1)
            .unwrap();
        f.store
            .append(NewTransaction::new(f.account, usd(-12_500), day(4, 9)).with_category(food.id))
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        let status = f.engine.budget_status(&f.store, food.id, date).unwrap().unwrap();
        assert_eq!(status.remaining, usd(-2_500));
        assert!(status.over_budget);
        assert_eq!(status.period.label(), "2025-04");

        f.store
            .set_category_budget(food.id, Some(BudgetRule::new(usd(20_000), BudgetPeriod::Monthly)), food.version)
            .unwrap();
        let status = f.engine.budget_status(&f.store, food.id, date).unwrap().unwrap();
        assert_eq!(status.limit, usd(20_000));
        assert!(!status.over_budget);
        assert_eq!(f.engine.budget_statuses(&f.store, date).unwrap().len(), 1);
    }

    #[test]
    fn rules_must_reference_known_categories() {
        let f = fixture();
        let err = f
            .engine
            .push_rule(&f.store, CategorizationRule::new(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, LedgerError::CategoryNotFound(_)));
        assert!(f.engine.rules().is_empty());
    }
}
