//! Per-line and per-invoice tax breakdown with rounding reconciliation.
//!
//! The calculator decides once per invoice whether the supply is inter-state
//! (single integrated component) or intra-state (two equal half-rate components),
//! computes every line at full decimal precision, then absorbs the difference
//! between the exact total and the integer grand total into the tax components
//! of the last line. Taxable values are never touched by rounding.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstkit_core::{
    DomainError, DomainResult, StateCode, TaxRate, checked_sum, round_to_integer, split_evenly,
};

use crate::invoice::InvoiceLine;

/// How an invoice relates to exports, as far as tax treatment is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFlag {
    /// Domestic supply: nature follows the state-code comparison.
    Domestic,
    /// Export: always inter-state.
    Export,
    /// Export with payment of tax, treated like a domestic supply.
    ExportWithPayment,
}

/// Whether a supply crosses jurisdictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyNature {
    InterState,
    IntraState,
}

impl SupplyNature {
    pub fn determine(seller_state: StateCode, buyer_state: StateCode, export: ExportFlag) -> Self {
        match export {
            ExportFlag::Export => SupplyNature::InterState,
            ExportFlag::Domestic | ExportFlag::ExportWithPayment => {
                if seller_state == buyer_state {
                    SupplyNature::IntraState
                } else {
                    SupplyNature::InterState
                }
            }
        }
    }

    pub fn is_inter_state(self) -> bool {
        self == SupplyNature::InterState
    }
}

/// Tax amounts attached to one invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTax {
    pub line_no: u32,
    pub tax_rate: TaxRate,
    pub taxable_value: Decimal,
    pub igst: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
}

impl LineTax {
    pub fn tax_total(&self) -> Decimal {
        self.igst + self.cgst + self.sgst
    }
}

/// Invoice-level tax breakdown. Line amounts always sum to the totals exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub nature: SupplyNature,
    pub lines: Vec<LineTax>,
    pub taxable_total: Decimal,
    pub igst_total: Decimal,
    pub cgst_total: Decimal,
    pub sgst_total: Decimal,
    /// `grand_total - exact_total`, already folded into the tax totals.
    pub round_off: Decimal,
    /// Integer grand total.
    pub grand_total: Decimal,
}

impl TaxBreakdown {
    pub fn tax_total(&self) -> Decimal {
        self.igst_total + self.cgst_total + self.sgst_total
    }

    /// Tax before the rounding adjustment was absorbed.
    pub fn nominal_tax_total(&self) -> Decimal {
        self.tax_total() - self.round_off
    }

    /// Taxable total plus nominal tax, at full precision.
    pub fn exact_total(&self) -> Decimal {
        self.taxable_total + self.nominal_tax_total()
    }
}

/// Computes [`TaxBreakdown`]s against a fixed set of permitted rate slabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxBreakdownCalculator {
    slabs: Vec<TaxRate>,
}

impl TaxBreakdownCalculator {
    pub fn new(slabs: impl IntoIterator<Item = TaxRate>) -> Self {
        let mut slabs: Vec<TaxRate> = slabs.into_iter().collect();
        slabs.sort();
        slabs.dedup();
        Self { slabs }
    }

    /// Calculator accepting the common 0/5/12/18/28 slabs.
    pub fn with_standard_slabs() -> Self {
        Self::new(
            [0i64, 5, 12, 18, 28]
                .into_iter()
                .filter_map(|p| TaxRate::new(Decimal::from(p)).ok()),
        )
    }

    pub fn slabs(&self) -> &[TaxRate] {
        &self.slabs
    }

    pub fn is_permitted(&self, rate: TaxRate) -> bool {
        self.slabs.binary_search(&rate).is_ok()
    }

    /// Compute the breakdown for `lines` sold from `seller_state` to `buyer_state`.
    pub fn compute_invoice_tax(
        &self,
        lines: &[InvoiceLine],
        seller_state: StateCode,
        buyer_state: StateCode,
        export: ExportFlag,
    ) -> DomainResult<TaxBreakdown> {
        let nature = SupplyNature::determine(seller_state, buyer_state, export);
        self.compute(lines, nature)
    }

    /// Compute the breakdown for a supply whose nature is already known.
    pub fn compute(&self, lines: &[InvoiceLine], nature: SupplyNature) -> DomainResult<TaxBreakdown> {
        if lines.is_empty() {
            return Err(DomainError::validation("cannot compute tax without lines"));
        }

        let mut line_taxes = Vec::with_capacity(lines.len());
        for line in lines {
            self.validate_line(line)?;
            let taxable = line.taxable_value()?;
            if taxable < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {} has negative taxable value {taxable}",
                    line.line_no
                )));
            }

            let tax = line.tax_rate.apply(taxable)?;
            let (igst, cgst, sgst) = match nature {
                SupplyNature::InterState => (tax, Decimal::ZERO, Decimal::ZERO),
                SupplyNature::IntraState => {
                    let half = tax / Decimal::TWO;
                    (Decimal::ZERO, half, half)
                }
            };

            line_taxes.push(LineTax {
                line_no: line.line_no,
                tax_rate: line.tax_rate,
                taxable_value: taxable,
                igst,
                cgst,
                sgst,
            });
        }

        let taxable_total = checked_sum(line_taxes.iter().map(|l| l.taxable_value))?;
        let mut igst_total = checked_sum(line_taxes.iter().map(|l| l.igst))?;
        let mut cgst_total = checked_sum(line_taxes.iter().map(|l| l.cgst))?;
        let mut sgst_total = checked_sum(line_taxes.iter().map(|l| l.sgst))?;

        let exact_total = checked_sum([taxable_total, igst_total, cgst_total, sgst_total])?;
        let grand_total = round_to_integer(exact_total);
        // |round_off| <= 0.5, so the adjustments below stay within range
        let round_off = grand_total - exact_total;

        if !round_off.is_zero() {
            let last = line_taxes
                .last_mut()
                .ok_or_else(|| DomainError::invariant("no line to absorb rounding"))?;
            match nature {
                SupplyNature::InterState => {
                    igst_total += round_off;
                    last.igst += round_off;
                }
                SupplyNature::IntraState => {
                    let (cgst_adj, sgst_adj) = split_evenly(round_off);
                    cgst_total += cgst_adj;
                    sgst_total += sgst_adj;
                    last.cgst += cgst_adj;
                    last.sgst += sgst_adj;
                }
            }
        }

        let breakdown = TaxBreakdown {
            nature,
            lines: line_taxes,
            taxable_total,
            igst_total,
            cgst_total,
            sgst_total,
            round_off,
            grand_total,
        };

        let reconciled = checked_sum([
            breakdown.taxable_total,
            breakdown.igst_total,
            breakdown.cgst_total,
            breakdown.sgst_total,
        ])?;
        if reconciled != breakdown.grand_total {
            return Err(DomainError::invariant("tax breakdown does not reconcile to grand total"));
        }

        Ok(breakdown)
    }

    fn validate_line(&self, line: &InvoiceLine) -> DomainResult<()> {
        if line.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {} quantity must be positive",
                line.line_no
            )));
        }
        if line.unit_rate < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {} unit rate must not be negative",
                line.line_no
            )));
        }
        if line.discount_percent < Decimal::ZERO || line.discount_percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "line {} discount must be between 0 and 100 percent",
                line.line_no
            )));
        }
        if !self.is_permitted(line.tax_rate) {
            return Err(DomainError::validation(format!(
                "line {} tax rate {} is not a permitted slab",
                line.line_no, line.tax_rate
            )));
        }
        Ok(())
    }
}

impl Default for TaxBreakdownCalculator {
    fn default() -> Self {
        Self::with_standard_slabs()
    }
}
