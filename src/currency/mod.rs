//! Fixed-point money values tagged with an ISO 4217 currency.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};

/// ISO 4217 currency representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyCode(pub String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of decimal digits carried by one major unit.
    pub fn minor_units(&self) -> u8 {
        minor_units_for(self.as_str())
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Signed monetary amount stored as integer minor units (cents for USD).
///
/// Arithmetic is checked: mixing currencies fails with
/// [`LedgerError::CurrencyMismatch`] and overflow with
/// [`LedgerError::AmountOverflow`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: CurrencyCode,
}

impl Money {
    pub fn from_minor(minor: i64, currency: impl Into<CurrencyCode>) -> Self {
        Self {
            minor,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<CurrencyCode>) -> Self {
        Self::from_minor(0, currency)
    }

    /// Parses a decimal string such as `-12.5` or `1234,56` into minor units.
    ///
    /// More fractional digits than the currency supports are rejected rather
    /// than rounded.
    pub fn parse(text: &str, currency: impl Into<CurrencyCode>) -> Result<Self> {
        let currency = currency.into();
        let raw = text.trim();
        let (negative, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let body = body.replace('_', "");
        if body.is_empty() {
            return Err(LedgerError::InvalidInput(format!("`{text}` is not an amount")));
        }
        let (whole, fraction) = match body.find(['.', ',']) {
            Some(pos) => (&body[..pos], &body[pos + 1..]),
            None => (body.as_str(), ""),
        };
        let digits = currency.minor_units() as usize;
        let valid = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !valid(whole) || !valid(fraction) || (whole.is_empty() && fraction.is_empty()) {
            return Err(LedgerError::InvalidInput(format!("`{text}` is not an amount")));
        }
        if fraction.len() > digits {
            return Err(LedgerError::InvalidInput(format!(
                "`{text}` has more than {digits} decimals for {currency}"
            )));
        }
        let overflow = || LedgerError::overflow(format!("parsing `{text}`"));
        let scale = 10_i64.checked_pow(digits as u32).ok_or_else(overflow)?;
        let whole_value = if whole.is_empty() {
            0
        } else {
            whole.parse::<i64>().map_err(|_| overflow())?
        };
        let padded = format!("{fraction:0<digits$}");
        let fraction_value = if padded.is_empty() {
            0
        } else {
            padded.parse::<i64>().map_err(|_| overflow())?
        };
        let magnitude = whole_value
            .checked_mul(scale)
            .and_then(|value| value.checked_add(fraction_value))
            .ok_or_else(overflow)?;
        let minor = if negative { -magnitude } else { magnitude };
        Ok(Self { minor, currency })
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    pub fn same_currency(&self, other: &Money) -> bool {
        self.currency == other.currency
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        self.ensure_currency(other)?;
        self.minor
            .checked_add(other.minor)
            .map(|minor| Money::from_minor(minor, self.currency.clone()))
            .ok_or_else(|| LedgerError::overflow(format!("{self} + {other}")))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money> {
        self.ensure_currency(other)?;
        self.minor
            .checked_sub(other.minor)
            .map(|minor| Money::from_minor(minor, self.currency.clone()))
            .ok_or_else(|| LedgerError::overflow(format!("{self} - {other}")))
    }

    pub fn checked_neg(&self) -> Result<Money> {
        self.minor
            .checked_neg()
            .map(|minor| Money::from_minor(minor, self.currency.clone()))
            .ok_or_else(|| LedgerError::overflow(format!("-({self})")))
    }

    /// Adds raw minor units of the same currency.
    pub fn checked_add_minor(&self, minor: i64) -> Result<Money> {
        self.minor
            .checked_add(minor)
            .map(|sum| Money::from_minor(sum, self.currency.clone()))
            .ok_or_else(|| LedgerError::overflow(format!("{self} + {minor} minor units")))
    }

    /// Renders the amount with symbol and digit grouping, e.g. `-$1,234.50`.
    pub fn display_with_symbol(&self) -> String {
        let body = group_digits(&format_minor(self.minor.unsigned_abs(), &self.currency));
        let sign = if self.minor < 0 { "-" } else { "" };
        format!("{}{}{}", sign, symbol_for(self.currency.as_str()), body)
    }

    fn ensure_currency(&self, other: &Money) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(LedgerError::CurrencyMismatch {
                entity: "amount".into(),
                expected: self.currency.clone(),
                found: other.currency.clone(),
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        write!(
            f,
            "{}{} {}",
            sign,
            format_minor(self.minor.unsigned_abs(), &self.currency),
            self.currency
        )
    }
}

/// Sums amounts that share `currency`, failing on overflow or a foreign tag.
pub fn sum<'a>(
    currency: &CurrencyCode,
    amounts: impl IntoIterator<Item = &'a Money>,
) -> Result<Money> {
    amounts
        .into_iter()
        .try_fold(Money::zero(currency.clone()), |acc, amount| {
            acc.checked_add(amount)
        })
}

pub fn symbol_for(code: &str) -> String {
    match code {
        "USD" => "$".into(),
        "EUR" => "€".into(),
        "GBP" => "£".into(),
        "JPY" => "¥".into(),
        "IDR" => "Rp".into(),
        "AUD" => "A$".into(),
        _ => format!("{code} "),
    }
}

pub fn minor_units_for(code: &str) -> u8 {
    match code {
        "JPY" | "KRW" => 0,
        "KWD" | "BHD" => 3,
        _ => 2,
    }
}

fn format_minor(magnitude: u64, currency: &CurrencyCode) -> String {
    let digits = currency.minor_units() as u32;
    if digits == 0 {
        return magnitude.to_string();
    }
    let scale = 10_u64.pow(digits);
    format!(
        "{}.{:0width$}",
        magnitude / scale,
        magnitude % scale,
        width = digits as usize
    )
}

fn group_digits(value: &str) -> String {
    let (int_part, rest) = match value.find('.') {
        Some(pos) => value.split_at(pos),
        None => (value, ""),
    };
    let mut grouped = String::new();
    for (count, ch) in int_part.chars().rev().enumerate() {
        if count != 0 && count % 3 == 0 {
            grouped.insert(0, ',');
        }
        grouped.insert(0, ch);
    }
    grouped.push_str(rest);
    grouped
}
