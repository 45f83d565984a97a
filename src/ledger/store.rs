use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    ops::Bound,
    sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    Account, AccountKind, BudgetRule, Category, CategoryTree, Conversion, EditOrigin,
    LedgerChange, LedgerObserver, NewTransaction, TimeRange, Transaction, TransactionPatch,
};
use crate::config::StorageSettings;
use crate::currency::Money;
use crate::errors::{LedgerError, Result};
use crate::storage::{
    PersistenceQueue, Record, RecordKind, RecordQuery, StorageBackend, StorageError,
};
use crate::utils::{invalid, lock, read_lock, write_lock};

type OrderKey = (DateTime<Utc>, Uuid);

/// Durable ledger of accounts, transactions, and categories.
///
/// Writes to one account are serialized by that account's gate; account and
/// category catalog writes share a single catalog gate (always taken after an
/// account gate). Each mutation is persisted first and swapped into memory
/// only once the backend confirmed it, so readers never see partial state.
pub struct LedgerStore {
    queue: PersistenceQueue,
    page_size: usize,
    state: RwLock<LedgerState>,
    account_gates: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    catalog_gate: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn LedgerObserver>>>,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    transactions: HashMap<Uuid, Transaction>,
    // Includes tombstoned rows; listings filter them.
    by_account: HashMap<Uuid, BTreeSet<OrderKey>>,
    external_ids: HashMap<(Uuid, String), Uuid>,
    categories: CategoryTree,
}

impl LedgerState {
    fn index(&mut self, txn: &Transaction) {
        self.by_account
            .entry(txn.account_id)
            .or_default()
            .insert(txn.order_key());
        if let Some(external_id) = &txn.external_id {
            self.external_ids
                .insert((txn.account_id, external_id.clone()), txn.id);
        }
    }

    fn replace(&mut self, before: &Transaction, after: Transaction) {
        if let Some(keys) = self.by_account.get_mut(&before.account_id) {
            keys.remove(&before.order_key());
        }
        self.index(&after);
        self.transactions.insert(after.id, after);
    }
}

impl LedgerStore {
    /// Opens a store over `backend`, rebuilding in-memory state from every
    /// persisted record.
    pub fn open(backend: Arc<dyn StorageBackend>, settings: &StorageSettings) -> Result<Self> {
        let queue = PersistenceQueue::new(backend, settings.timeout())
            .map_err(|err| LedgerError::persistence("persistence worker", err))?;
        Self::with_queue(queue, settings.page_size)
    }

    pub fn with_queue(queue: PersistenceQueue, page_size: usize) -> Result<Self> {
        let mut state = LedgerState::default();

        for record in load_all(&queue, RecordKind::Account)? {
            let account: Account = decode(&record)?;
            state.accounts.insert(account.id, account);
        }

        let mut categories = CategoryTree::new();
        for record in load_all(&queue, RecordKind::Category)? {
            categories.put(decode::<Category>(&record)?);
        }
        for category in categories.sorted() {
            if categories.ancestors(category.id).contains(&category.id) {
                return Err(LedgerError::persistence(
                    format!("category {}", category.id),
                    StorageError::Corrupt("category tree contains a cycle".into()),
                ));
            }
        }
        state.categories = categories;

        for record in load_all(&queue, RecordKind::Transaction)? {
            let txn: Transaction = decode(&record)?;
            if !state.accounts.contains_key(&txn.account_id) {
                return Err(LedgerError::persistence(
                    format!("transaction {}", txn.id),
                    StorageError::Corrupt(format!("unknown account {}", txn.account_id)),
                ));
            }
            if let Some(external_id) = &txn.external_id {
                let key = (txn.account_id, external_id.clone());
                if let Some(other) = state.external_ids.get(&key) {
                    return Err(LedgerError::persistence(
                        format!("transaction {}", txn.id),
                        StorageError::Corrupt(format!(
                            "external id `{external_id}` is also used by transaction {other}"
                        )),
                    ));
                }
            }
            state.index(&txn);
            state.transactions.insert(txn.id, txn);
        }

        info!(
            accounts = state.accounts.len(),
            transactions = state.transactions.len(),
            categories = state.categories.len(),
            "ledger store opened"
        );

        Ok(Self {
            queue,
            page_size: page_size.max(1),
            state: RwLock::new(state),
            account_gates: Mutex::new(HashMap::new()),
            catalog_gate: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
        })
    }

    pub fn subscribe(&self, observer: Arc<dyn LedgerObserver>) {
        write_lock(&self.observers).push(observer);
    }

    pub(crate) fn queue(&self) -> &PersistenceQueue {
        &self.queue
    }

    // ---- accounts -------------------------------------------------------

    pub fn open_account(
        &self,
        name: &str,
        kind: AccountKind,
        opening_balance: Money,
    ) -> Result<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("account name cannot be empty"));
        }
        let code = opening_balance.currency().as_str();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid(format!("`{code}` is not a currency code")));
        }

        let _catalog = lock(&self.catalog_gate);
        if self.account_by_name(name).is_some() {
            return Err(LedgerError::DuplicateName(name.to_string()));
        }
        let account = Account::new(name, kind, opening_balance);
        self.save(&account_label(account.id), encode_account(&account))?;
        write_lock(&self.state)
            .accounts
            .insert(account.id, account.clone());
        info!(account = %account.id, name = %account.name, currency = %account.currency, "account opened");
        self.notify(LedgerChange::AccountOpened(account.clone()));
        Ok(account)
    }

    /// Archives an account. Its history stays readable; appends are refused.
    pub fn archive_account(&self, id: Uuid, expected_version: u64) -> Result<Account> {
        let gate = self.account_gate(id);
        let _guard = lock(&gate);
        let _catalog = lock(&self.catalog_gate);

        let current = self.account(id)?;
        if current.version != expected_version {
            return Err(LedgerError::VersionConflict {
                entity: id,
                expected: expected_version,
                actual: current.version,
            });
        }
        if current.archived {
            return Ok(current);
        }
        let mut next = current;
        next.archived = true;
        next.version += 1;
        self.save(&account_label(id), encode_account(&next))?;
        write_lock(&self.state).accounts.insert(id, next.clone());
        info!(account = %id, "account archived");
        self.notify(LedgerChange::AccountUpdated(next.clone()));
        Ok(next)
    }

    pub fn account(&self, id: Uuid) -> Result<Account> {
        read_lock(&self.state)
            .accounts
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    pub fn account_by_name(&self, name: &str) -> Option<Account> {
        let wanted = name.trim().to_lowercase();
        read_lock(&self.state)
            .accounts
            .values()
            .find(|account| account.name.to_lowercase() == wanted)
            .cloned()
    }

    /// Looks an account up by id or, failing that, by name.
    pub fn resolve_account(&self, reference: &str) -> Result<Account> {
        if let Ok(id) = Uuid::parse_str(reference.trim()) {
            return self.account(id);
        }
        self.account_by_name(reference)
            .ok_or_else(|| invalid(format!("unknown account `{}`", reference.trim())))
    }

    /// All accounts, archived ones included, ordered by name.
    pub fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = read_lock(&self.state).accounts.values().cloned().collect();
        accounts.sort_by_key(|account| (account.name.to_lowercase(), account.id));
        accounts
    }

    // ---- transactions ---------------------------------------------------

    /// Appends a transaction at version 1.
    ///
    /// Retrying with the same explicit id and identical content returns the
    /// stored row instead of failing. That includes a row whose write timed
    /// out but still reached the backend.
    pub fn append(&self, draft: NewTransaction) -> Result<Transaction> {
        let gate = self.account_gate(draft.account_id);
        let _guard = lock(&gate);

        let account = {
            let state = read_lock(&self.state);
            let account = state
                .accounts
                .get(&draft.account_id)
                .cloned()
                .ok_or(LedgerError::AccountNotFound(draft.account_id))?;
            if let Some(existing) = draft.id.and_then(|id| state.transactions.get(&id)) {
                if existing.same_content(&draft) {
                    debug!(transaction = %existing.id, "append replayed");
                    return Ok(existing.clone());
                }
                return Err(invalid(format!("transaction id {} is already used", existing.id)));
            }
            if account.archived {
                return Err(LedgerError::AccountArchived(account.id));
            }
            if let Some(external_id) = &draft.external_id {
                if external_id.trim().is_empty() {
                    return Err(invalid("external id cannot be blank"));
                }
                if let Some(existing) = state
                    .external_ids
                    .get(&(draft.account_id, external_id.clone()))
                {
                    return Err(LedgerError::DuplicateExternalId {
                        account_id: draft.account_id,
                        external_id: external_id.clone(),
                        existing: *existing,
                    });
                }
            }
            if let Some(category) = draft.category_id {
                if !state.categories.contains(category) {
                    return Err(LedgerError::CategoryNotFound(category));
                }
            }
            account
        };

        let id = draft.id.unwrap_or_else(Uuid::new_v4);
        check_currency(&account, &draft.amount, draft.conversion.as_ref(), id)?;
        if draft.id.is_some() {
            if let Some(stored) = self.stored_transaction(id)? {
                if !stored.same_content(&draft) {
                    return Err(invalid(format!("transaction id {id} is already used")));
                }
                {
                    let mut state = write_lock(&self.state);
                    state.index(&stored);
                    state.transactions.insert(id, stored.clone());
                }
                info!(transaction = %id, "append recovered a row the backend already held");
                self.notify(LedgerChange::TransactionAppended(stored.clone()));
                return Ok(stored);
            }
        }

        let now = Utc::now();
        let txn = Transaction {
            id,
            account_id: draft.account_id,
            amount: draft.amount,
            timestamp: draft.timestamp,
            category_id: draft.category_id,
            memo: draft.memo,
            external_id: draft.external_id,
            conversion: draft.conversion,
            version: 1,
            deleted: false,
            synced_version: (draft.origin == EditOrigin::Import).then_some(1),
            created_at: now,
            updated_at: now,
        };
        self.save(&transaction_label(id), encode_transaction(&txn))?;
        {
            let mut state = write_lock(&self.state);
            state.index(&txn);
            state.transactions.insert(id, txn.clone());
        }
        debug!(transaction = %id, account = %txn.account_id, amount = %txn.amount, "transaction appended");
        self.notify(LedgerChange::TransactionAppended(txn.clone()));
        Ok(txn)
    }

    pub fn edit(&self, id: Uuid, patch: TransactionPatch, expected_version: u64) -> Result<Transaction> {
        self.edit_with(id, patch, expected_version, EditOrigin::Manual)
    }

    /// Versioned edit. Fails with [`LedgerError::VersionConflict`] when
    /// `expected_version` is stale; the stored row is left untouched.
    pub fn edit_with(
        &self,
        id: Uuid,
        patch: TransactionPatch,
        expected_version: u64,
        origin: EditOrigin,
    ) -> Result<Transaction> {
        let account_id = self.get(id)?.account_id;
        let gate = self.account_gate(account_id);
        let _guard = lock(&gate);

        let (current, account) = self.current_for_write(id, expected_version)?;
        if patch.is_empty() {
            return Err(invalid("edit carries no changes"));
        }
        if let Some(Some(category)) = patch.category_id {
            if !read_lock(&self.state).categories.contains(category) {
                return Err(LedgerError::CategoryNotFound(category));
            }
        }

        let mut next = patch.apply(&current, &account.currency);
        check_currency(&account, &next.amount, next.conversion.as_ref(), id)?;
        next.version = current.version + 1;
        next.updated_at = Utc::now();
        if origin == EditOrigin::Import {
            next.synced_version = Some(next.version);
        }

        self.save(&transaction_label(id), encode_transaction(&next))?;
        write_lock(&self.state).replace(&current, next.clone());
        debug!(transaction = %id, version = next.version, ?origin, "transaction edited");
        self.notify(LedgerChange::TransactionEdited {
            before: current,
            after: next.clone(),
        });
        Ok(next)
    }

    /// Tombstones a transaction. The row stays stored for audit and import
    /// dedup.
    pub fn soft_delete(&self, id: Uuid, expected_version: u64) -> Result<Transaction> {
        let account_id = self.get(id)?.account_id;
        let gate = self.account_gate(account_id);
        let _guard = lock(&gate);

        let (current, _) = self.current_for_write(id, expected_version)?;
        let mut next = current.clone();
        next.deleted = true;
        next.version = current.version + 1;
        next.updated_at = Utc::now();

        self.save(&transaction_label(id), encode_transaction(&next))?;
        write_lock(&self.state).replace(&current, next.clone());
        debug!(transaction = %id, version = next.version, "transaction deleted");
        self.notify(LedgerChange::TransactionDeleted(next.clone()));
        Ok(next)
    }

    /// Returns the transaction, tombstoned rows included.
    pub fn get(&self, id: Uuid) -> Result<Transaction> {
        read_lock(&self.state)
            .transactions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    /// Lazy, timestamp-ordered listing (ties by id) of one account within
    /// `range`. Tombstones are skipped unless
    /// [`TransactionCursor::including_deleted`] is used.
    pub fn list_by_account(&self, account_id: Uuid, range: TimeRange) -> Result<TransactionCursor<'_>> {
        self.account(account_id)?;
        Ok(TransactionCursor {
            store: self,
            account_id,
            exhausted: range.is_empty(),
            range,
            include_deleted: false,
            page_size: self.page_size,
            after: None,
            buffer: VecDeque::new(),
        })
    }

    pub fn find_by_external_id(&self, account_id: Uuid, external_id: &str) -> Option<Transaction> {
        let state = read_lock(&self.state);
        state
            .external_ids
            .get(&(account_id, external_id.to_string()))
            .and_then(|id| state.transactions.get(id))
            .cloned()
    }

    /// Live transactions of every account inside `range`, in ledger order.
    pub fn transactions_in_range(&self, range: TimeRange) -> Vec<Transaction> {
        self.collect_live(|txn| range.contains(txn.timestamp))
    }

    /// Live transactions filed directly under `category` (or uncategorized
    /// for `None`) inside `range`.
    pub fn transactions_for_category(&self, category: Option<Uuid>, range: TimeRange) -> Vec<Transaction> {
        self.collect_live(|txn| txn.category_id == category && range.contains(txn.timestamp))
    }

    pub fn transaction_count(&self) -> usize {
        read_lock(&self.state).transactions.len()
    }

    // ---- categories -----------------------------------------------------

    pub fn add_category(&self, name: &str, parent: Option<Uuid>) -> Result<Category> {
        let _catalog = lock(&self.catalog_gate);
        let category = Category::new(name.trim(), parent);
        read_lock(&self.state).categories.validate(&category)?;
        self.commit_category(None, category)
    }

    /// Re-parents a category. Moves that would form a cycle fail with
    /// [`LedgerError::CategoryCycle`] and leave the tree unchanged.
    pub fn move_category(&self, id: Uuid, parent: Option<Uuid>, expected_version: u64) -> Result<Category> {
        self.update_category(id, expected_version, |category| {
            category.parent_id = parent;
            Ok(())
        })
    }

    pub fn rename_category(&self, id: Uuid, name: &str, expected_version: u64) -> Result<Category> {
        let name = name.trim().to_string();
        self.update_category(id, expected_version, move |category| {
            category.name = name;
            Ok(())
        })
    }

    pub fn set_category_budget(
        &self,
        id: Uuid,
        budget: Option<BudgetRule>,
        expected_version: u64,
    ) -> Result<Category> {
        self.update_category(id, expected_version, move |category| {
            if let Some(rule) = &budget {
                if rule.limit.is_negative() {
                    return Err(invalid("budget limit cannot be negative"));
                }
            }
            category.budget = budget;
            Ok(())
        })
    }

    pub fn category(&self, id: Uuid) -> Result<Category> {
        read_lock(&self.state)
            .categories
            .get(id)
            .cloned()
            .ok_or(LedgerError::CategoryNotFound(id))
    }

    pub fn category_by_name(&self, name: &str) -> Option<Category> {
        read_lock(&self.state).categories.find_by_name(name).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        read_lock(&self.state)
            .categories
            .sorted()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn category_tree(&self) -> CategoryTree {
        read_lock(&self.state).categories.clone()
    }

    // ---- internals ------------------------------------------------------

    fn update_category(
        &self,
        id: Uuid,
        expected_version: u64,
        mutate: impl FnOnce(&mut Category) -> Result<()>,
    ) -> Result<Category> {
        let _catalog = lock(&self.catalog_gate);
        let current = self.category(id)?;
        if current.version != expected_version {
            return Err(LedgerError::VersionConflict {
                entity: id,
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = current.clone();
        mutate(&mut next)?;
        read_lock(&self.state).categories.validate(&next)?;
        next.version += 1;
        self.commit_category(Some(current), next)
    }

    fn commit_category(&self, before: Option<Category>, after: Category) -> Result<Category> {
        self.save(&format!("category {}", after.id), encode_category(&after))?;
        write_lock(&self.state).categories.put(after.clone());
        debug!(category = %after.id, name = %after.name, version = after.version, "category saved");
        self.notify(LedgerChange::CategoryChanged {
            before,
            after: after.clone(),
        });
        Ok(after)
    }

    fn current_for_write(&self, id: Uuid, expected_version: u64) -> Result<(Transaction, Account)> {
        let state = read_lock(&self.state);
        let current = state
            .transactions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(id))?;
        if current.version != expected_version {
            return Err(LedgerError::VersionConflict {
                entity: id,
                expected: expected_version,
                actual: current.version,
            });
        }
        if current.deleted {
            return Err(LedgerError::TransactionDeleted(id));
        }
        let account = state
            .accounts
            .get(&current.account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(current.account_id))?;
        Ok((current, account))
    }

    fn collect_live(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = read_lock(&self.state)
            .transactions
            .values()
            .filter(|txn| txn.is_live() && keep(txn))
            .cloned()
            .collect();
        rows.sort_by_key(Transaction::order_key);
        rows
    }

    fn account_gate(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        lock(&self.account_gates)
            .entry(account_id)
            .or_default()
            .clone()
    }

    /// Reads a transaction straight from the backend, bypassing memory.
    fn stored_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.queue
            .load_record(RecordKind::Transaction, &id.to_string())
            .map_err(|err| LedgerError::persistence(transaction_label(id), err))?
            .map(|record| decode(&record))
            .transpose()
    }

    fn save(&self, entity: &str, record: std::result::Result<Record, StorageError>) -> Result<()> {
        let record = record.map_err(|err| LedgerError::persistence(entity, err))?;
        self.queue
            .save_record(record)
            .map_err(|err| LedgerError::persistence(entity, err))
    }

    fn notify(&self, change: LedgerChange) {
        for observer in read_lock(&self.observers).iter() {
            observer.on_change(&change);
        }
    }
}

/// Paged iterator returned by [`LedgerStore::list_by_account`]. Each page is
/// read under a short read lock against the last committed state.
pub struct TransactionCursor<'a> {
    store: &'a LedgerStore,
    account_id: Uuid,
    range: TimeRange,
    include_deleted: bool,
    page_size: usize,
    after: Option<OrderKey>,
    buffer: VecDeque<Transaction>,
    exhausted: bool,
}

impl<'a> TransactionCursor<'a> {
    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn fill(&mut self) {
        let state = read_lock(&self.store.state);
        let Some(keys) = state.by_account.get(&self.account_id) else {
            self.exhausted = true;
            return;
        };
        let lower = match (self.after, self.range.start) {
            (Some(after), _) => Bound::Excluded(after),
            (None, Some(start)) => Bound::Included((start, Uuid::nil())),
            (None, None) => Bound::Unbounded,
        };
        let upper = match self.range.end {
            Some(end) => Bound::Excluded((end, Uuid::nil())),
            None => Bound::Unbounded,
        };

        let mut last = None;
        let mut full = false;
        for key in keys.range((lower, upper)) {
            last = Some(*key);
            if let Some(txn) = state.transactions.get(&key.1) {
                if self.include_deleted || txn.is_live() {
                    self.buffer.push_back(txn.clone());
                }
            }
            if self.buffer.len() >= self.page_size {
                full = true;
                break;
            }
        }
        if last.is_some() {
            self.after = last;
        }
        if !full {
            self.exhausted = true;
        }
    }
}

impl<'a> Iterator for TransactionCursor<'a> {
    type Item = Transaction;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        self.buffer.pop_front()
    }
}

fn check_currency(
    account: &Account,
    amount: &Money,
    conversion: Option<&Conversion>,
    id: Uuid,
) -> Result<()> {
    let mismatch = |found: &Money| LedgerError::CurrencyMismatch {
        entity: transaction_label(id),
        expected: account.currency.clone(),
        found: found.currency().clone(),
    };
    match conversion {
        None if amount.currency() == &account.currency => Ok(()),
        None => Err(mismatch(amount)),
        Some(_) if amount.currency() == &account.currency => Err(invalid(
            "conversion given for an amount already in the account currency",
        )),
        Some(conversion) if conversion.settled.currency() != &account.currency => {
            Err(mismatch(&conversion.settled))
        }
        Some(conversion) if conversion.settled.minor().signum() != amount.minor().signum() => {
            Err(invalid("settled amount must carry the same sign as the amount"))
        }
        Some(_) => Ok(()),
    }
}

fn load_all(queue: &PersistenceQueue, kind: RecordKind) -> Result<Vec<Record>> {
    queue
        .query_range(RecordQuery::all(kind))
        .map_err(|err| LedgerError::persistence(format!("{kind} records"), err))
}

fn decode<T: serde::de::DeserializeOwned>(record: &Record) -> Result<T> {
    record
        .decode()
        .map_err(|err| LedgerError::persistence(format!("{} {}", record.kind, record.id), err))
}

fn account_label(id: Uuid) -> String {
    format!("account {id}")
}

fn transaction_label(id: Uuid) -> String {
    format!("transaction {id}")
}

fn encode_account(account: &Account) -> std::result::Result<Record, StorageError> {
    Ok(Record::encode(RecordKind::Account, account.id.to_string(), account)?
        .with_version(account.version, account.archived))
}

fn encode_transaction(txn: &Transaction) -> std::result::Result<Record, StorageError> {
    Ok(Record::encode(RecordKind::Transaction, txn.id.to_string(), txn)?
        .with_partition(txn.account_id.to_string())
        .with_sort_key(txn.timestamp)
        .with_version(txn.version, txn.deleted))
}

fn encode_category(category: &Category) -> std::result::Result<Record, StorageError> {
    Ok(Record::encode(RecordKind::Category, category.id.to_string(), category)?
        .with_version(category.version, false))
}
