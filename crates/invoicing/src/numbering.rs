//! Deterministic, type-scoped invoice numbering.
//!
//! Numbers look like `T-INV-2024-0007`: type letter, calendar year, and a
//! sequence scoped by (tenant, type, year). The sequence is derived from the count
//! of already-persisted invoices in that scope; uniqueness of the resulting
//! [`SequenceScope`] + sequence is enforced by storage.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use gstkit_core::{DomainError, DomainResult, TenantId};

use crate::invoice::InvoiceType;

/// The numbering scope an invoice belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceScope {
    pub tenant_id: TenantId,
    pub invoice_type: InvoiceType,
    pub year: i32,
}

/// Assigned document number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceNumber {
    invoice_type: InvoiceType,
    year: i32,
    sequence: u32,
}

impl InvoiceNumber {
    pub fn new(invoice_type: InvoiceType, year: i32, sequence: u32) -> DomainResult<Self> {
        if sequence == 0 {
            return Err(DomainError::validation("invoice sequence starts at 1"));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "invoice year must have four digits, got {year}"
            )));
        }
        Ok(Self {
            invoice_type,
            year,
            sequence,
        })
    }

    pub fn invoice_type(&self) -> InvoiceType {
        self.invoice_type
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-INV-{}-{:04}",
            self.invoice_type.letter(),
            self.year,
            self.sequence
        )
    }
}

impl FromStr for InvoiceNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("InvoiceNumber: '{s}'"));

        let mut parts = s.splitn(4, '-');
        let letter = parts.next().ok_or_else(invalid)?;
        if parts.next() != Some("INV") {
            return Err(invalid());
        }
        let year = parts.next().ok_or_else(invalid)?;
        let seq = parts.next().ok_or_else(invalid)?;

        let mut chars = letter.chars();
        let invoice_type = match (chars.next(), chars.next()) {
            (Some(c), None) => InvoiceType::from_letter(c).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        if seq.len() < 4 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let sequence: u32 = seq.parse().map_err(|_| invalid())?;
        Self::new(invoice_type, year, sequence)
    }
}

impl TryFrom<String> for InvoiceNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvoiceNumber> for String {
    fn from(value: InvoiceNumber) -> Self {
        value.to_string()
    }
}

/// Pure number derivation: `sequence = prior_count + 1`.
///
/// Not a counter. Callers read the count of finalized invoices in the scope at the
/// moment of finalization and rely on the storage uniqueness constraint to detect
/// a concurrent writer that derived the same number.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvoiceNumberSequencer;

impl InvoiceNumberSequencer {
    pub fn next(&self, scope: &SequenceScope, prior_count: u32) -> DomainResult<InvoiceNumber> {
        let sequence = prior_count
            .checked_add(1)
            .ok_or_else(|| DomainError::invariant("invoice sequence overflow"))?;
        InvoiceNumber::new(scope.invoice_type, scope.year, sequence)
    }
}
