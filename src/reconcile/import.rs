use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::{ImportBatch, ImportRecord};
use crate::currency::Money;
use crate::errors::{LedgerError, Result};
use crate::ledger::{day_start, LedgerStore};
use crate::utils::invalid;

/// Accepted import document shapes: `{"batch_id": .., "records": [..]}` or a
/// bare record array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Batch {
        #[serde(default)]
        batch_id: Option<String>,
        records: Vec<RawRecord>,
    },
    Records(Vec<RawRecord>),
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    external_id: Option<String>,
    /// Account id or account name.
    account: String,
    amount: RawAmount,
    #[serde(default)]
    currency: Option<String>,
    timestamp: String,
    #[serde(default)]
    memo: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    fn as_text(&self) -> String {
        match self {
            RawAmount::Text(text) => text.clone(),
            RawAmount::Number(number) => number.to_string(),
        }
    }
}

/// Parses an import document, resolving account references against `store`.
///
/// Amounts are decimal strings or numbers in major units of the account
/// currency unless `currency` says otherwise; timestamps are RFC 3339 or
/// plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_import(json: &str, default_batch_id: &str, store: &LedgerStore) -> Result<ImportBatch> {
    let document: ImportDocument = serde_json::from_str(json)
        .map_err(|err| invalid(format!("import document is not valid: {err}")))?;
    let (batch_id, raw) = match document {
        ImportDocument::Batch { batch_id, records } => {
            (batch_id.unwrap_or_else(|| default_batch_id.to_string()), records)
        }
        ImportDocument::Records(records) => (default_batch_id.to_string(), records),
    };

    let records = raw
        .into_iter()
        .enumerate()
        .map(|(index, raw)| convert(index, raw, store))
        .collect::<Result<Vec<_>>>()?;
    Ok(ImportBatch::new(batch_id, records))
}

/// Reads and parses an import file. The file stem is the default batch id, so
/// re-importing the same file resumes or no-ops.
pub fn read_import_file(path: &Path, store: &LedgerStore) -> Result<ImportBatch> {
    let json = fs::read_to_string(path)
        .map_err(|err| invalid(format!("cannot read import file {}: {err}", path.display())))?;
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "import".to_string());
    parse_import(&json, &stem, store)
}

fn convert(index: usize, raw: RawRecord, store: &LedgerStore) -> Result<ImportRecord> {
    let account = store.resolve_account(&raw.account).map_err(|err| match err {
        LedgerError::AccountNotFound(_) | LedgerError::InvalidInput(_) => {
            invalid(format!("record {index}: unknown account `{}`", raw.account))
        }
        other => other,
    })?;
    let currency = raw
        .currency
        .as_deref()
        .map(Into::into)
        .unwrap_or_else(|| account.currency.clone());
    let amount = Money::parse(&raw.amount.as_text(), currency)?;
    let timestamp = parse_timestamp(&raw.timestamp)
        .ok_or_else(|| invalid(format!("record {index}: bad timestamp `{}`", raw.timestamp)))?;
    let mut record = ImportRecord::new(account.id, amount, timestamp).with_memo(raw.memo);
    if let Some(external_id) = raw.external_id {
        record = record.with_external_id(external_id);
    }
    Ok(record)
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(day_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::ledger::AccountKind;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn store() -> LedgerStore {
        let store = LedgerStore::open(Arc::new(MemoryStorage::new()), &StorageSettings::default()).unwrap();
        store
            .open_account("Checking", AccountKind::Bank, Money::zero("USD"))
            .unwrap();
        store
    }

    #[test]
    fn parses_batch_object_with_mixed_amount_forms() {
        let store = store();
        let json = r#"{
            "batch_id": "may-statement",
            "records": [
                {"external_id": "A1", "account": "Checking", "amount": "-12.50",
                 "timestamp": "2025-05-02T10:30:00Z", "memo": "Lunch"},
                {"account": "checking", "amount": 1500, "timestamp": "2025-05-03"}
            ]
        }"#;
        let batch = parse_import(json, "fallback", &store).unwrap();
        assert_eq!(batch.id, "may-statement");
        assert_eq!(batch.records[0].amount.minor(), -1_250);
        assert_eq!(batch.records[0].external_id.as_deref(), Some("A1"));
        assert_eq!(batch.records[1].amount.minor(), 150_000);
        assert_eq!(
            batch.records[1].timestamp,
            Utc.with_ymd_and_hms(2025, 5, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn bare_array_uses_default_batch_id() {
        let store = store();
        let json = r#"[{"account": "Checking", "amount": "-1", "timestamp": "2025-01-01"}]"#;
        let batch = parse_import(json, "file-stem", &store).unwrap();
        assert_eq!(batch.id, "file-stem");
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn reports_the_offending_record() {
        let store = store();
        let json = r#"[
            {"account": "Checking", "amount": "-1", "timestamp": "2025-01-01"},
            {"account": "Savings", "amount": "-1", "timestamp": "2025-01-01"}
        ]"#;
        let err = parse_import(json, "x", &store).unwrap_err();
        assert!(err.to_string().contains("record 1"));

        let bad_time = r#"[{"account": "Checking", "amount": "1", "timestamp": "yesterday"}]"#;
        assert!(parse_import(bad_time, "x", &store).is_err());
    }
}
