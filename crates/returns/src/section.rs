//! Detailed-filing sections, their classification keys, and accumulated amounts.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstkit_core::{DomainResult, Gstin, StateCode, TaxRate, checked_add};
use gstkit_invoicing::{InvoiceNumber, LineTax, TaxBreakdown};

/// Sections of the detailed (sales) return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Supplies to registered businesses, one row per invoice.
    RegisteredBusiness,
    /// Inter-state supplies to unregistered buyers above the large-transaction threshold.
    LargeUnregisteredInterstate,
    /// Remaining unregistered supplies, aggregated by place of supply and rate.
    SmallUnregistered,
    Export,
    NilOrExempt,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::RegisteredBusiness,
        SectionKind::LargeUnregisteredInterstate,
        SectionKind::SmallUnregistered,
        SectionKind::Export,
        SectionKind::NilOrExempt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::RegisteredBusiness => "registered_business",
            SectionKind::LargeUnregisteredInterstate => "large_unregistered_interstate",
            SectionKind::SmallUnregistered => "small_unregistered",
            SectionKind::Export => "export",
            SectionKind::NilOrExempt => "nil_or_exempt",
        }
    }
}

/// Bucket of the nil-rated/exempt table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NilCategory {
    InterStateRegistered,
    InterStateUnregistered,
    IntraStateRegistered,
    IntraStateUnregistered,
}

impl NilCategory {
    pub fn of(inter_state: bool, registered: bool) -> Self {
        match (inter_state, registered) {
            (true, true) => NilCategory::InterStateRegistered,
            (true, false) => NilCategory::InterStateUnregistered,
            (false, true) => NilCategory::IntraStateRegistered,
            (false, false) => NilCategory::IntraStateUnregistered,
        }
    }
}

/// Classification key of a section row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionKey {
    /// One row per invoice.
    Invoice {
        invoice_number: InvoiceNumber,
        place_of_supply: StateCode,
        counterparty: Option<Gstin>,
    },
    /// Accumulated by place of supply and rate.
    RateBucket {
        place_of_supply: StateCode,
        rate: TaxRate,
    },
    /// Accumulated by nil-table category.
    NilBucket { category: NilCategory },
}

impl SectionKey {
    pub fn place_of_supply(&self) -> Option<StateCode> {
        match self {
            SectionKey::Invoice {
                place_of_supply, ..
            }
            | SectionKey::RateBucket {
                place_of_supply, ..
            } => Some(*place_of_supply),
            SectionKey::NilBucket { .. } => None,
        }
    }
}

/// Taxable value and tax components, accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionAmounts {
    pub taxable_value: Decimal,
    pub igst: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
}

impl SectionAmounts {
    pub fn tax_total(&self) -> Decimal {
        self.igst + self.cgst + self.sgst
    }

    pub fn of_invoice(tax: &TaxBreakdown) -> Self {
        Self {
            taxable_value: tax.taxable_total,
            igst: tax.igst_total,
            cgst: tax.cgst_total,
            sgst: tax.sgst_total,
        }
    }

    pub fn of_line(line: &LineTax) -> Self {
        Self {
            taxable_value: line.taxable_value,
            igst: line.igst,
            cgst: line.cgst,
            sgst: line.sgst,
        }
    }
}

impl SectionAmounts {
    /// Component-wise sum, rejecting totals that do not fit in a `Decimal`.
    pub fn checked_add(self, rhs: Self) -> DomainResult<Self> {
        Ok(Self {
            taxable_value: checked_add(self.taxable_value, rhs.taxable_value)?,
            igst: checked_add(self.igst, rhs.igst)?,
            cgst: checked_add(self.cgst, rhs.cgst)?,
            sgst: checked_add(self.sgst, rhs.sgst)?,
        })
    }

    pub fn try_sum(amounts: impl IntoIterator<Item = Self>) -> DomainResult<Self> {
        amounts
            .into_iter()
            .try_fold(Self::default(), Self::checked_add)
    }
}

/// Header fields carried by per-invoice rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetail {
    pub invoice_date: NaiveDate,
    pub invoice_value: Decimal,
    pub reverse_charge: bool,
    pub export_with_payment: bool,
}

/// One row of the detailed filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRow {
    pub section: SectionKind,
    pub key: SectionKey,
    pub amounts: SectionAmounts,
    /// Invoices that contributed to this row, in classification order.
    pub invoices: Vec<InvoiceNumber>,
    /// Present on per-invoice rows only.
    pub detail: Option<InvoiceDetail>,
}

impl SectionRow {
    pub fn new(section: SectionKind, key: SectionKey, detail: Option<InvoiceDetail>) -> Self {
        Self {
            section,
            key,
            amounts: SectionAmounts::default(),
            invoices: Vec::new(),
            detail,
        }
    }

    pub fn accumulate(&mut self, amounts: SectionAmounts, invoice: InvoiceNumber) -> DomainResult<()> {
        self.amounts = self.amounts.checked_add(amounts)?;
        if self.invoices.last() != Some(&invoice) {
            self.invoices.push(invoice);
        }
        Ok(())
    }
}
