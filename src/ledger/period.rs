use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::range::{day_start, TimeRange};
use crate::errors::LedgerError;

/// Length of a budget period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BudgetPeriod {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BudgetPeriod {
    pub fn key_for(self, date: NaiveDate) -> PeriodKey {
        PeriodKey::containing(self, date)
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BudgetPeriod::Weekly => "weekly",
            BudgetPeriod::Monthly => "monthly",
            BudgetPeriod::Quarterly => "quarterly",
            BudgetPeriod::Yearly => "yearly",
        };
        f.write_str(label)
    }
}

impl FromStr for BudgetPeriod {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" | "week" => Ok(BudgetPeriod::Weekly),
            "monthly" | "month" => Ok(BudgetPeriod::Monthly),
            "quarterly" | "quarter" => Ok(BudgetPeriod::Quarterly),
            "yearly" | "year" | "annual" => Ok(BudgetPeriod::Yearly),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown budget period `{other}`"
            ))),
        }
    }
}

/// One concrete period: its kind plus the first day it covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    pub period: BudgetPeriod,
    pub start: NaiveDate,
}

impl PeriodKey {
    pub fn containing(period: BudgetPeriod, date: NaiveDate) -> Self {
        let start = match period {
            BudgetPeriod::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            BudgetPeriod::Monthly => first_of_month(date.year(), date.month()).unwrap_or(date),
            BudgetPeriod::Quarterly => {
                let month = ((date.month() - 1) / 3) * 3 + 1;
                first_of_month(date.year(), month).unwrap_or(date)
            }
            BudgetPeriod::Yearly => first_of_month(date.year(), 1).unwrap_or(date),
        };
        Self { period, start }
    }

    pub fn containing_time(period: BudgetPeriod, at: DateTime<Utc>) -> Self {
        Self::containing(period, at.date_naive())
    }

    /// First day after the period.
    pub fn end(&self) -> NaiveDate {
        match self.period {
            BudgetPeriod::Weekly => self.start + Duration::days(7),
            BudgetPeriod::Monthly => shift_month(self.start, 1),
            BudgetPeriod::Quarterly => shift_month(self.start, 3),
            BudgetPeriod::Yearly => shift_month(self.start, 12),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            period: self.period,
            start: self.end(),
        }
    }

    pub fn previous(&self) -> Self {
        let day_before = self.start.pred_opt().unwrap_or(self.start);
        Self::containing(self.period, day_before)
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::between(day_start(self.start), day_start(self.end()))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.range().contains(at)
    }

    pub fn label(&self) -> String {
        match self.period {
            BudgetPeriod::Weekly => {
                let week = self.start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            BudgetPeriod::Monthly => format!("{}-{:02}", self.start.year(), self.start.month()),
            BudgetPeriod::Quarterly => {
                format!("{}-Q{}", self.start.year(), (self.start.month() - 1) / 3 + 1)
            }
            BudgetPeriod::Yearly => format!("{}", self.start.year()),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn shift_month(date: NaiveDate, months: i32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month() as i32 + months;
    while month > 12 {
        month -= 12;
        year += 1;
    }
    while month < 1 {
        month += 12;
        year -= 1;
    }
    let day = date.day().min(days_in_month(year, month as u32));
    NaiveDate::from_ymd_opt(year, month as u32, day).unwrap_or(NaiveDate::MAX)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_next| first_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
