//! Exact decimal money helpers and the tax-rate value object.
//!
//! Amounts are `rust_decimal::Decimal` throughout; nothing here touches floating point.
//!
//! "Full precision" is bounded by `Decimal` itself: a 96-bit mantissa and at most
//! 28 fractional digits. Products and quotients whose exact scale would exceed 28
//! digits are rounded to 28 by `rust_decimal`. Results whose integer part exceeds
//! the mantissa are rejected with a validation error.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// `a + b`, rejecting results that do not fit in a `Decimal`.
pub fn checked_add(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::validation(format!("amount overflow adding {a} and {b}")))
}

/// `a * b`, rejecting results that do not fit in a `Decimal`.
pub fn checked_mul(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| DomainError::validation(format!("amount overflow multiplying {a} by {b}")))
}

/// Sum of `amounts`, rejecting totals that do not fit in a `Decimal`.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, checked_add)
}

/// Round to the nearest whole currency unit (half away from zero).
pub fn round_to_integer(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Split `amount` into two halves as evenly as its own decimal scale allows.
///
/// The first half is truncated toward zero at the input's scale; the second half
/// takes the remaining unit, so `first + second == amount` always holds and
/// `|second| >= |first|`.
pub fn split_evenly(amount: Decimal) -> (Decimal, Decimal) {
    let scale = amount.scale();
    let first = (amount / Decimal::TWO).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    (first, amount - first)
}

/// Declared tax rate, as a percentage (e.g. `18` for 18%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "tax rate must not be negative, got {percent}"
            )));
        }
        if percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "tax rate must not exceed 100%, got {percent}"
            )));
        }
        Ok(Self(percent.normalize()))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Tax on `taxable` at the full rate, at full precision (28 fractional digits at most).
    pub fn apply(&self, taxable: Decimal) -> DomainResult<Decimal> {
        checked_mul(taxable, self.0)?
            .checked_div(Decimal::ONE_HUNDRED)
            .ok_or_else(|| DomainError::validation(format!("tax overflow on {taxable} at {self}")))
    }
}

impl core::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<Decimal> for TaxRate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaxRate> for Decimal {
    fn from(value: TaxRate) -> Self {
        value.0
    }
}
