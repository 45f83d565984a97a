use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::currency::{CurrencyCode, Money};

/// Settlement of a foreign-currency amount into the account currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversion {
    pub settled: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_source: Option<String>,
}

impl Conversion {
    pub fn new(settled: Money) -> Self {
        Self {
            settled,
            rate_source: None,
        }
    }

    pub fn with_rate_source(mut self, source: impl Into<String>) -> Self {
        self.rate_source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub memo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<Conversion>,
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
    /// Version last written by an import; `None` for direct entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_version: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn currency(&self) -> &CurrencyCode {
        self.amount.currency()
    }

    /// Amount in the account currency; this is what balances add up.
    pub fn settled_amount(&self) -> &Money {
        self.conversion
            .as_ref()
            .map(|conversion| &conversion.settled)
            .unwrap_or(&self.amount)
    }

    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// `true` once someone edited the row after its last import write.
    pub fn manually_edited(&self) -> bool {
        self.version > self.synced_version.unwrap_or(1)
    }

    pub(crate) fn order_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.timestamp, self.id)
    }

    pub(crate) fn same_content(&self, draft: &NewTransaction) -> bool {
        self.account_id == draft.account_id
            && self.amount == draft.amount
            && self.timestamp == draft.timestamp
            && self.category_id == draft.category_id
            && self.memo == draft.memo
            && self.external_id == draft.external_id
            && self.conversion == draft.conversion
    }
}

/// Who is writing a transaction. Import writes keep `synced_version` current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditOrigin {
    #[default]
    Manual,
    Import,
}

/// Input for [`crate::ledger::LedgerStore::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Explicit id, used as an idempotency key for retried appends.
    pub id: Option<Uuid>,
    pub account_id: Uuid,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub category_id: Option<Uuid>,
    pub memo: String,
    pub external_id: Option<String>,
    pub conversion: Option<Conversion>,
    pub origin: EditOrigin,
}

impl NewTransaction {
    pub fn new(account_id: Uuid, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            account_id,
            amount,
            timestamp,
            category_id: None,
            memo: String::new(),
            external_id: None,
            conversion: None,
            origin: EditOrigin::Manual,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn imported(mut self) -> Self {
        self.origin = EditOrigin::Import;
        self
    }
}

/// Field changes for a versioned edit. The owning account cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    pub amount: Option<Money>,
    pub timestamp: Option<DateTime<Utc>>,
    pub category_id: Option<Option<Uuid>>,
    pub memo: Option<String>,
    pub conversion: Option<Option<Conversion>>,
}

impl TransactionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn category(mut self, category_id: Option<Uuid>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn conversion(mut self, conversion: Option<Conversion>) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.timestamp.is_none()
            && self.category_id.is_none()
            && self.memo.is_none()
            && self.conversion.is_none()
    }

    /// Applies the patch to a copy of `current`. A new amount in the account
    /// currency drops a stale conversion unless the patch sets one.
    pub(crate) fn apply(&self, current: &Transaction, account_currency: &CurrencyCode) -> Transaction {
        let mut next = current.clone();
        if let Some(amount) = &self.amount {
            next.amount = amount.clone();
            if self.conversion.is_none() && amount.currency() == account_currency {
                next.conversion = None;
            }
        }
        if let Some(timestamp) = self.timestamp {
            next.timestamp = timestamp;
        }
        if let Some(category_id) = self.category_id {
            next.category_id = category_id;
        }
        if let Some(memo) = &self.memo {
            next.memo = memo.clone();
        }
        if let Some(conversion) = &self.conversion {
            next.conversion = conversion.clone();
        }
        next
    }
}
