//! Money value object backed by integer micro-units.
//!
//! Store APIs report prices in micros (`priceAmountMicros`); keeping the
//! internal representation in micros avoids float drift when amounts
//! round-trip through receipts, ledger rows, and logs.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

const MICROS_PER_UNIT: i64 = 1_000_000;

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Creates a currency from a three-letter ISO code; normalizes to
    /// uppercase.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                "expected a three-letter ISO 4217 code",
            ));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the inner code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monetary amount in micro-units of a currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount_micros: i64,
    currency: Currency,
}

impl Money {
    /// Creates a money value from micro-units.
    pub fn from_micros(amount_micros: i64, currency: Currency) -> Self {
        Self {
            amount_micros,
            currency,
        }
    }

    /// Creates a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::from_micros(0, currency)
    }

    /// Parses a decimal string ("69.99", "110", "110.0") into micros
    /// without going through floating point.
    pub fn from_major_str(s: &str, currency: Currency) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::empty_field("amount"));
        }
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ValidationError::invalid_format("amount", "no digits"));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::invalid_format(
                "amount",
                "expected a decimal number",
            ));
        }
        if frac_part.len() > 6 {
            return Err(ValidationError::invalid_format(
                "amount",
                "more than six fractional digits",
            ));
        }

        let int_value: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| ValidationError::invalid_format("amount", "integer part too large"))?
        };
        let mut frac_value: i64 = if frac_part.is_empty() {
            0
        } else {
            frac_part
                .parse()
                .map_err(|_| ValidationError::invalid_format("amount", "bad fractional part"))?
        };
        for _ in frac_part.len()..6 {
            frac_value *= 10;
        }

        let micros = int_value
            .checked_mul(MICROS_PER_UNIT)
            .and_then(|v| v.checked_add(frac_value))
            .and_then(|v| v.checked_mul(sign))
            .ok_or_else(|| ValidationError::invalid_format("amount", "amount overflows"))?;
        Ok(Self::from_micros(micros, currency))
    }

    /// Converts a JSON number (as receipt metadata reports prices) into
    /// micros. Integers convert exactly; floats round to the nearest
    /// micro.
    pub fn from_json_number(
        value: &serde_json::Number,
        currency: Currency,
    ) -> Result<Self, ValidationError> {
        if let Some(v) = value.as_i64() {
            let micros = v
                .checked_mul(MICROS_PER_UNIT)
                .ok_or_else(|| ValidationError::invalid_format("amount", "amount overflows"))?;
            return Ok(Self::from_micros(micros, currency));
        }
        let v = value
            .as_f64()
            .ok_or_else(|| ValidationError::invalid_format("amount", "not a number"))?;
        if !v.is_finite() {
            return Err(ValidationError::invalid_format("amount", "not finite"));
        }
        let micros = v * MICROS_PER_UNIT as f64;
        if micros.abs() > i64::MAX as f64 / 2.0 {
            return Err(ValidationError::invalid_format("amount", "amount overflows"));
        }
        Ok(Self::from_micros(micros.round() as i64, currency))
    }

    /// Returns the amount in micro-units.
    pub fn amount_micros(&self) -> i64 {
        self.amount_micros
    }

    /// Returns the currency.
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Whether this is a zero amount.
    pub fn is_zero(&self) -> bool {
        self.amount_micros == 0
    }

    /// Renders the amount in major units with at least two decimal
    /// places, e.g. "69.99" or "110.00".
    pub fn to_major_string(&self) -> String {
        let sign = if self.amount_micros < 0 { "-" } else { "" };
        let abs = self.amount_micros.unsigned_abs();
        let int_part = abs / MICROS_PER_UNIT as u64;
        let mut frac = format!("{:06}", abs % MICROS_PER_UNIT as u64);
        while frac.len() > 2 && frac.ends_with('0') {
            frac.pop();
        }
        format!("{}{}.{}", sign, int_part, frac)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major_string(), self.currency)
    }
}
