//! Read-only aggregation over the ledger and the balance engine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::balance::BalanceEngine;
use crate::currency::{CurrencyCode, Money};
use crate::errors::{LedgerError, Result};
use crate::ledger::{day_start, BudgetPeriod, LedgerStore, PeriodKey, TimeRange, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpend {
    /// `None` is the uncategorized bucket.
    pub category_id: Option<Uuid>,
    pub name: String,
    /// Outflows are positive, refunds reduce it.
    pub spent: Money,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendReport {
    pub range: TimeRange,
    pub currency: CurrencyCode,
    pub categories: Vec<CategorySpend>,
    pub total: Money,
    /// Rows that settle in another currency and were left out.
    pub excluded_foreign: usize,
}

impl SpendReport {
    pub fn for_category(&self, category_id: Option<Uuid>) -> Option<&CategorySpend> {
        self.categories
            .iter()
            .find(|entry| entry.category_id == category_id)
    }
}

/// Spend of one category including everything filed beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRollup {
    pub category_id: Uuid,
    pub path: String,
    pub depth: usize,
    pub direct: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetWorthPoint {
    pub at: DateTime<Utc>,
    pub total: Money,
    /// Accounts in another currency, not part of `total`.
    pub excluded_accounts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountActivity {
    pub account_id: Uuid,
    pub range: TimeRange,
    pub opening: Money,
    pub inflow: Money,
    /// Magnitude of outgoing amounts.
    pub outflow: Money,
    pub closing: Money,
    pub transaction_count: usize,
}

pub struct ReportingService<'a> {
    store: &'a LedgerStore,
    balances: &'a BalanceEngine,
}

impl<'a> ReportingService<'a> {
    pub fn new(store: &'a LedgerStore, balances: &'a BalanceEngine) -> Self {
        Self { store, balances }
    }

    pub fn balance_as_of(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<Money> {
        self.balances.balance_as_of(account_id, at)
    }

    /// Spend per directly assigned category inside `range`, largest first.
    /// Only rows settling in `currency` are counted.
    pub fn spend_by_category(&self, range: TimeRange, currency: &CurrencyCode) -> Result<SpendReport> {
        let tree = self.store.category_tree();
        let mut buckets: HashMap<Option<Uuid>, (i64, usize)> = HashMap::new();
        let mut excluded_foreign = 0;
        for txn in self.store.transactions_in_range(range) {
            if txn.settled_amount().currency() != currency {
                excluded_foreign += 1;
                continue;
            }
            let bucket = buckets.entry(txn.category_id).or_default();
            bucket.0 = subtract(bucket.0, &txn)?;
            bucket.1 += 1;
        }

        let mut total = 0_i64;
        let mut categories = Vec::with_capacity(buckets.len());
        for (category_id, (spent, transaction_count)) in buckets {
            total = total
                .checked_add(spent)
                .ok_or_else(|| LedgerError::overflow("spend total"))?;
            let name = match category_id {
                Some(id) => tree.path_name(id).unwrap_or_else(|| id.to_string()),
                None => "Uncategorized".to_string(),
            };
            categories.push(CategorySpend {
                category_id,
                name,
                spent: Money::from_minor(spent, currency.clone()),
                transaction_count,
            });
        }
        categories.sort_by(|a, b| {
            b.spent
                .minor()
                .cmp(&a.spent.minor())
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(SpendReport {
            range,
            currency: currency.clone(),
            categories,
            total: Money::from_minor(total, currency.clone()),
            excluded_foreign,
        })
    }

    /// Spend inside `range` rolled up the category tree, in tree order.
    pub fn category_rollup(&self, range: TimeRange, currency: &CurrencyCode) -> Result<Vec<CategoryRollup>> {
        let report = self.spend_by_category(range, currency)?;
        let tree = self.store.category_tree();
        let direct: HashMap<Uuid, i64> = report
            .categories
            .iter()
            .filter_map(|entry| entry.category_id.map(|id| (id, entry.spent.minor())))
            .collect();

        let mut rows = Vec::with_capacity(tree.len());
        let mut stack: Vec<(Uuid, usize)> = tree.roots().iter().rev().map(|c| (c.id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let own = direct.get(&id).copied().unwrap_or(0);
            let total = tree
                .descendants(id)
                .iter()
                .filter_map(|child| direct.get(child))
                .try_fold(own, |acc, value| acc.checked_add(*value))
                .ok_or_else(|| LedgerError::overflow("category rollup"))?;
            rows.push(CategoryRollup {
                category_id: id,
                path: tree.path_name(id).unwrap_or_default(),
                depth,
                direct: Money::from_minor(own, currency.clone()),
                total: Money::from_minor(total, currency.clone()),
            });
            stack.extend(tree.children(id).iter().rev().map(|c| (c.id, depth + 1)));
        }
        Ok(rows)
    }

    /// Sum of account balances in `currency` at each instant. Archived
    /// accounts keep contributing their history.
    pub fn net_worth_over_time(
        &self,
        points: &[DateTime<Utc>],
        currency: &CurrencyCode,
    ) -> Result<Vec<NetWorthPoint>> {
        let accounts = self.store.accounts();
        let (included, excluded): (Vec<_>, Vec<_>) = accounts
            .into_iter()
            .partition(|account| &account.currency == currency);

        points
            .iter()
            .map(|&at| {
                let mut total = Money::zero(currency.clone());
                for account in &included {
                    total = total.checked_add(&self.balances.balance_as_of(account.id, at)?)?;
                }
                Ok(NetWorthPoint {
                    at,
                    total,
                    excluded_accounts: excluded.len(),
                })
            })
            .collect()
    }

    /// Net worth at the close of every `period` between `first` and `last`.
    pub fn net_worth_series(
        &self,
        first: NaiveDate,
        last: NaiveDate,
        period: BudgetPeriod,
        currency: &CurrencyCode,
    ) -> Result<Vec<(PeriodKey, NetWorthPoint)>> {
        if first > last {
            return Err(LedgerError::InvalidInput(format!(
                "series start {first} is after its end {last}"
            )));
        }
        let mut keys = Vec::new();
        let mut key = PeriodKey::containing(period, first);
        while key.start <= last {
            keys.push(key);
            key = key.next();
        }
        let closes: Vec<DateTime<Utc>> = keys
            .iter()
            .map(|key| day_start(key.end()) - Duration::nanoseconds(1))
            .collect();
        let points = self.net_worth_over_time(&closes, currency)?;
        Ok(keys.into_iter().zip(points).collect())
    }

    /// Opening, inflow, outflow and closing of one account over `range`.
    pub fn account_activity(&self, account_id: Uuid, range: TimeRange) -> Result<AccountActivity> {
        let account = self.store.account(account_id)?;
        let opening = match range.start {
            Some(start) => self.balances.balance_before(account_id, start)?,
            None => account.opening_balance.clone(),
        };
        let rows = self.balances.running_balances(account_id, range)?;
        let mut inflow = 0_i64;
        let mut outflow = 0_i64;
        for row in &rows {
            let minor = row.amount.minor();
            let overflow = || LedgerError::overflow("account activity");
            if minor >= 0 {
                inflow = inflow.checked_add(minor).ok_or_else(overflow)?;
            } else {
                outflow = outflow.checked_sub(minor).ok_or_else(overflow)?;
            }
        }
        let closing = rows
            .last()
            .map(|row| row.balance.clone())
            .unwrap_or_else(|| opening.clone());
        Ok(AccountActivity {
            account_id,
            range,
            inflow: Money::from_minor(inflow, account.currency.clone()),
            outflow: Money::from_minor(outflow, account.currency.clone()),
            opening,
            closing,
            transaction_count: rows.len(),
        })
    }
}

fn subtract(acc: i64, txn: &Transaction) -> Result<i64> {
    acc.checked_sub(txn.settled_amount().minor())
        .ok_or_else(|| LedgerError::overflow(format!("spend of transaction {}", txn.id)))
}
