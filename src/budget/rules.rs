use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::currency::Money;
use crate::errors::{LedgerError, Result};
use crate::ledger::{NewTransaction, Transaction};

/// Case-insensitive memo regular expression, serialized as its source text.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoPattern {
    source: String,
    regex: Regex,
}

impl MemoPattern {
    pub fn new(source: &str) -> Result<Self> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map_err(|err| LedgerError::InvalidInput(format!("invalid memo pattern `{source}`: {err}")))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, memo: &str) -> bool {
        self.regex.is_match(memo)
    }
}

impl fmt::Debug for MemoPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MemoPattern").field(&self.source).finish()
    }
}

impl PartialEq for MemoPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for MemoPattern {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<MemoPattern> for String {
    fn from(pattern: MemoPattern) -> Self {
        pattern.source
    }
}

/// Inclusive bounds on the signed amount in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl AmountRange {
    pub fn between(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn contains(&self, minor: i64) -> bool {
        self.min.map_or(true, |min| minor >= min) && self.max.map_or(true, |max| minor <= max)
    }
}

/// One categorization rule. Unset criteria match anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationRule {
    pub category_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<MemoPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AmountRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
}

impl CategorizationRule {
    pub fn new(category_id: Uuid) -> Self {
        Self {
            category_id,
            memo: None,
            amount: None,
            account_id: None,
        }
    }

    pub fn memo(mut self, pattern: &str) -> Result<Self> {
        self.memo = Some(MemoPattern::new(pattern)?);
        Ok(self)
    }

    pub fn amount(mut self, range: AmountRange) -> Self {
        self.amount = Some(range);
        self
    }

    pub fn account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn matches(&self, facts: &TransactionFacts<'_>) -> bool {
        self.account_id.map_or(true, |id| id == facts.account_id)
            && self
                .amount
                .map_or(true, |range| range.contains(facts.amount.minor()))
            && self
                .memo
                .as_ref()
                .map_or(true, |pattern| pattern.is_match(facts.memo))
    }
}

/// The inputs rules look at.
#[derive(Debug, Clone, Copy)]
pub struct TransactionFacts<'a> {
    pub account_id: Uuid,
    pub amount: &'a Money,
    pub memo: &'a str,
}

impl<'a> From<&'a Transaction> for TransactionFacts<'a> {
    fn from(txn: &'a Transaction) -> Self {
        Self {
            account_id: txn.account_id,
            amount: &txn.amount,
            memo: &txn.memo,
        }
    }
}

impl<'a> From<&'a NewTransaction> for TransactionFacts<'a> {
    fn from(draft: &'a NewTransaction) -> Self {
        Self {
            account_id: draft.account_id,
            amount: &draft.amount,
            memo: &draft.memo,
        }
    }
}

/// Ordered rules; the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<CategorizationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategorizationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CategorizationRule] {
        &self.rules
    }

    pub fn push(&mut self, rule: CategorizationRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn categorize(&self, facts: &TransactionFacts<'_>) -> Option<Uuid> {
        self.rules
            .iter()
            .find(|rule| rule.matches(facts))
            .map(|rule| rule.category_id)
    }
}
