use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use super::ImportRecord;
use crate::config::ReconcileSettings;
use crate::ledger::{TimeRange, Transaction};

// Ten years; larger windows are clamped.
const MAX_TOLERANCE_SECS: i64 = 10 * 366 * 24 * 60 * 60;

static MEMO_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("memo normalizer pattern is valid"));

/// Lowercases and collapses punctuation and whitespace runs to one space.
pub fn normalize_memo(memo: &str) -> String {
    MEMO_NOISE
        .replace_all(&memo.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Jaro-Winkler similarity of the normalized memos, in `[0, 1]`.
pub fn memo_similarity(left: &str, right: &str) -> f64 {
    let left = normalize_memo(left);
    let right = normalize_memo(right);
    if left == right {
        return 1.0;
    }
    strsim::jaro_winkler(&left, &right)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub time_delta_ms: i64,
    pub similarity: f64,
}

/// Fuzzy matcher for import records that carry no external id.
#[derive(Debug, Clone)]
pub struct FingerprintMatcher {
    amount_tolerance: i64,
    time_tolerance: Duration,
    min_similarity: f64,
}

impl FingerprintMatcher {
    pub fn new(settings: &ReconcileSettings) -> Self {
        let secs = settings.timestamp_tolerance_secs.clamp(0, MAX_TOLERANCE_SECS);
        Self {
            amount_tolerance: settings.amount_tolerance_minor.max(0),
            time_tolerance: Duration::seconds(secs),
            min_similarity: settings.memo_similarity,
        }
    }

    /// Candidate window around `at`, both ends inclusive.
    pub fn window(&self, at: DateTime<Utc>) -> TimeRange {
        let start = at.checked_sub_signed(self.time_tolerance);
        let end = at
            .checked_add_signed(self.time_tolerance)
            .and_then(|end| end.checked_add_signed(Duration::nanoseconds(1)));
        TimeRange { start, end }
    }

    pub fn score(&self, record: &ImportRecord, candidate: &Transaction) -> Option<MatchScore> {
        if candidate.account_id != record.account_id
            || candidate.amount.currency() != record.amount.currency()
        {
            return None;
        }
        let amount_gap = (candidate.amount.minor() as i128 - record.amount.minor() as i128).abs();
        if amount_gap > self.amount_tolerance as i128 {
            return None;
        }
        let time_delta = (candidate.timestamp - record.timestamp).abs();
        if time_delta > self.time_tolerance {
            return None;
        }
        let similarity = memo_similarity(&candidate.memo, &record.memo);
        if similarity < self.min_similarity {
            return None;
        }
        Some(MatchScore {
            time_delta_ms: time_delta.num_milliseconds(),
            similarity,
        })
    }

    /// Best unclaimed candidate: smallest time gap, then highest memo
    /// similarity, then lowest id.
    pub fn best<'a>(
        &self,
        record: &ImportRecord,
        candidates: &'a [Transaction],
        claimed: &HashSet<Uuid>,
    ) -> Option<&'a Transaction> {
        candidates
            .iter()
            .filter(|candidate| !claimed.contains(&candidate.id))
            .filter_map(|candidate| self.score(record, candidate).map(|score| (score, candidate)))
            .min_by(|(left, a), (right, b)| {
                left.time_delta_ms
                    .cmp(&right.time_delta_ms)
                    .then_with(|| right.similarity.total_cmp(&left.similarity))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|(_, candidate)| candidate)
    }
}
