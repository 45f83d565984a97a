use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::currency::{CurrencyCode, Money};
use crate::errors::LedgerError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AccountKind {
    Cash,
    #[default]
    Bank,
    Credit,
    Other,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountKind::Cash => "cash",
            AccountKind::Bank => "bank",
            AccountKind::Credit => "credit",
            AccountKind::Other => "other",
        };
        f.write_str(label)
    }
}

impl FromStr for AccountKind {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(AccountKind::Cash),
            "bank" => Ok(AccountKind::Bank),
            "credit" | "card" => Ok(AccountKind::Credit),
            "other" => Ok(AccountKind::Other),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown account kind `{other}`"
            ))),
        }
    }
}

/// Represents a financial account that owns a sequence of transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub currency: CurrencyCode,
    pub kind: AccountKind,
    pub opening_balance: Money,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    pub version: u64,
}

impl Account {
    /// Creates an account whose currency is taken from `opening_balance`.
    pub fn new(name: impl Into<String>, kind: AccountKind, opening_balance: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            currency: opening_balance.currency().clone(),
            kind,
            opening_balance,
            created_at: Utc::now(),
            archived: false,
            version: 1,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.archived
    }
}
