use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::balance::BalanceEngine;
use crate::budget::{BudgetEngine, BudgetSnapshot, BudgetStatus, CategorizationRule, TransactionFacts};
use crate::config::{ConfigManager, LedgerConfig};
use crate::currency::Money;
use crate::errors::{LedgerError, Result};
use crate::ledger::{
    Account, AccountKind, BudgetRule, Category, LedgerObserver, LedgerStore, NewTransaction, PeriodKey,
    Transaction, TransactionPatch,
};
use crate::reconcile::{
    read_import_file, ImportBatch, ReconcileConflict, ReconcileReport, ReconciliationEngine, Resolution,
};
use crate::reporting::ReportingService;
use crate::storage::{JsonFileStorage, MemoryStorage, StorageBackend};

/// Facade wiring the ledger store, the derived engines, and configuration.
pub struct LedgerManager {
    config: LedgerConfig,
    data_dir: Option<PathBuf>,
    store: LedgerStore,
    balances: Arc<BalanceEngine>,
    budgets: Arc<BudgetEngine>,
    reconciler: ReconciliationEngine,
}

impl LedgerManager {
    pub fn open(backend: Arc<dyn StorageBackend>, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let store = LedgerStore::open(backend, &config.storage)?;
        let balances = Arc::new(BalanceEngine::new(config.snapshots.clone()));
        let budgets = Arc::new(BudgetEngine::new(config.base_currency.clone()));
        // Subscribed before hydrating so no committed change slips between.
        store.subscribe(balances.clone() as Arc<dyn LedgerObserver>);
        store.subscribe(budgets.clone() as Arc<dyn LedgerObserver>);
        balances.hydrate(&store)?;
        let reconciler = ReconciliationEngine::new(config.reconcile.clone(), config.retry.clone());

        info!(
            accounts = store.accounts().len(),
            transactions = store.transaction_count(),
            "ledger opened"
        );
        Ok(Self {
            config,
            data_dir: None,
            store,
            balances,
            budgets,
            reconciler,
        })
    }

    /// Opens the JSON file ledger rooted at `data_dir`.
    pub fn open_dir(data_dir: impl Into<PathBuf>, config: LedgerConfig) -> Result<Self> {
        let data_dir = data_dir.into();
        let backend = JsonFileStorage::new(data_dir.clone())
            .map_err(|err| LedgerError::persistence(format!("ledger at {}", data_dir.display()), err))?;
        let mut manager = Self::open(Arc::new(backend), config)?;
        manager.data_dir = Some(data_dir);
        Ok(manager)
    }

    /// Loads configuration from `configs` and opens the data directory it
    /// names.
    pub fn from_config(configs: &ConfigManager) -> Result<Self> {
        let config = configs.load()?;
        let data_dir = configs.data_dir(&config);
        Self::open_dir(data_dir, config)
    }

    pub fn in_memory(config: LedgerConfig) -> Result<Self> {
        Self::open(Arc::new(MemoryStorage::new()), config)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn balances(&self) -> &BalanceEngine {
        &self.balances
    }

    pub fn budgets(&self) -> &BudgetEngine {
        &self.budgets
    }

    pub fn reconciler(&self) -> &ReconciliationEngine {
        &self.reconciler
    }

    pub fn reports(&self) -> ReportingService<'_> {
        ReportingService::new(&self.store, &self.balances)
    }

    // ---- accounts -------------------------------------------------------

    pub fn open_account(&self, name: &str, kind: AccountKind, opening_balance: Money) -> Result<Account> {
        self.store.open_account(name, kind, opening_balance)
    }

    pub fn archive_account(&self, id: Uuid, expected_version: u64) -> Result<Account> {
        self.store.archive_account(id, expected_version)
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.store.accounts()
    }

    // ---- transactions ---------------------------------------------------

    /// Appends a transaction, filling in the category from the current rules
    /// when none is given.
    pub fn record(&self, mut draft: NewTransaction) -> Result<Transaction> {
        if draft.category_id.is_none() {
            draft.category_id = self.budgets.categorize(&TransactionFacts::from(&draft));
        }
        self.store.append(draft)
    }

    pub fn edit(&self, id: Uuid, patch: TransactionPatch, expected_version: u64) -> Result<Transaction> {
        self.store.edit(id, patch, expected_version)
    }

    pub fn recategorize(&self, id: Uuid, category_id: Option<Uuid>, expected_version: u64) -> Result<Transaction> {
        self.store
            .edit(id, TransactionPatch::new().category(category_id), expected_version)
    }

    pub fn soft_delete(&self, id: Uuid, expected_version: u64) -> Result<Transaction> {
        self.store.soft_delete(id, expected_version)
    }

    pub fn transaction(&self, id: Uuid) -> Result<Transaction> {
        self.store.get(id)
    }

    // ---- categories and budgets -------------------------------------------

    pub fn add_category(&self, name: &str, parent: Option<Uuid>) -> Result<Category> {
        self.store.add_category(name, parent)
    }

    pub fn move_category(&self, id: Uuid, parent: Option<Uuid>, expected_version: u64) -> Result<Category> {
        self.store.move_category(id, parent, expected_version)
    }

    pub fn set_budget(&self, id: Uuid, rule: Option<BudgetRule>, expected_version: u64) -> Result<Category> {
        self.store.set_category_budget(id, rule, expected_version)
    }

    pub fn add_rule(&self, rule: CategorizationRule) -> Result<()> {
        self.budgets.push_rule(&self.store, rule)
    }

    pub fn set_rules(&self, rules: Vec<CategorizationRule>) -> Result<()> {
        self.budgets.set_rules(&self.store, rules)
    }

    pub fn budget_consumed(&self, category_id: Uuid, period: PeriodKey) -> Result<BudgetSnapshot> {
        self.budgets.budget_consumed(&self.store, category_id, period)
    }

    pub fn budget_statuses(&self, date: NaiveDate) -> Result<Vec<BudgetStatus>> {
        self.budgets.budget_statuses(&self.store, date)
    }

    // ---- balances -------------------------------------------------------

    pub fn balance_as_of(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<Money> {
        self.balances.balance_as_of(account_id, at)
    }

    pub fn closing_balance(&self, account_id: Uuid) -> Result<Money> {
        self.balances.closing_balance(account_id)
    }

    // ---- reconciliation -------------------------------------------------

    pub fn import(&self, batch: &ImportBatch) -> Result<ReconcileReport> {
        let rules = self.budgets.rules();
        self.reconciler.run(&self.store, &rules, batch)
    }

    pub fn import_file(&self, path: &Path) -> Result<ReconcileReport> {
        let batch = read_import_file(path, &self.store)?;
        self.import(&batch)
    }

    pub fn resolve_conflict(&self, conflict: &ReconcileConflict, resolution: Resolution) -> Result<Transaction> {
        self.reconciler.resolve_conflict(&self.store, conflict, resolution)
    }
}
