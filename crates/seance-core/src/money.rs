//! Money value object for per-minute rates and call earnings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// A monetary amount in the platform currency.
///
/// Stored as micro-units (millionths of a unit) so that per-minute rates
/// with sub-cent precision survive arithmetic without float drift.
/// Earnings are rounded to cents with [`Money::round_to_cents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    micros: i64,
}

impl Money {
    const MICROS_PER_UNIT: i64 = 1_000_000;
    const MICROS_PER_CENT: i64 = 10_000;

    /// Creates Money from a decimal amount (e.g. `2.50`).
    pub fn from_amount(amount: f64) -> Self {
        if !amount.is_finite() {
            return Self::zero();
        }
        let micros = (amount * Self::MICROS_PER_UNIT as f64).round() as i64;
        Self { micros }
    }

    /// Creates Money from whole cents.
    pub fn from_cents(cents: i64) -> Self {
        Self {
            micros: cents.saturating_mul(Self::MICROS_PER_CENT),
        }
    }

    pub const fn zero() -> Self {
        Self { micros: 0 }
    }

    /// Returns the amount as a float.
    pub fn as_amount(&self) -> f64 {
        self.micros as f64 / Self::MICROS_PER_UNIT as f64
    }

    /// Returns the amount in whole cents, rounded half away from zero.
    pub fn as_cents(&self) -> i64 {
        let half = Self::MICROS_PER_CENT / 2;
        if self.micros >= 0 {
            (self.micros + half) / Self::MICROS_PER_CENT
        } else {
            (self.micros - half) / Self::MICROS_PER_CENT
        }
    }

    /// Returns this amount rounded to 2 decimals.
    #[must_use]
    pub fn round_to_cents(&self) -> Self {
        Self::from_cents(self.as_cents())
    }

    pub fn is_zero(&self) -> bool {
        self.micros == 0
    }

    /// Earnings for `elapsed_seconds` at this per-minute rate, rounded to cents.
    ///
    /// `elapsed / 60 * rate`, so 90 seconds at 2.00/min is 3.00.
    #[must_use]
    pub fn earnings_for(&self, elapsed_seconds: u64) -> Self {
        let micros = i128::from(self.micros)
            .saturating_mul(i128::from(elapsed_seconds))
            / 60;
        let micros = i64::try_from(micros).unwrap_or(i64::MAX);
        Self { micros }.round_to_cents()
    }

    /// Formats the amount with two decimals, e.g. "$3.00".
    pub fn format(&self) -> String {
        let cents = self.as_cents();
        let sign = if cents < 0 { "-" } else { "" };
        let abs = cents.unsigned_abs();
        format!("{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            micros: self.micros.saturating_add(other.micros),
        }
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Plain decimal number on the wire
        serializer.serialize_f64(self.as_amount())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let amount = f64::deserialize(deserializer)?;
        Ok(Money::from_amount(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}
