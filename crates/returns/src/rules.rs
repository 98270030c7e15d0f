//! Jurisdiction configuration and the ordered classification rule list.
//!
//! Classification is data, not control flow: a [`RuleSet`] is an ordered list of
//! tagged predicates. `FirstMatch` rules are mutually exclusive (the first one that
//! matches wins); `Always` rules apply independently of every other rule.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstkit_core::{DomainError, DomainResult, TaxRate};
use gstkit_invoicing::{Invoice, TaxBreakdownCalculator};

use crate::section::SectionKind;

/// Jurisdiction-specific parameters the engine must be given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionRules {
    /// Taxable value above which an inter-state unregistered supply is reported per invoice.
    pub large_b2c_threshold: Decimal,
    /// Permitted tax-rate slabs, in percent.
    pub rate_slabs: Vec<TaxRate>,
}

impl JurisdictionRules {
    pub fn new(large_b2c_threshold: Decimal, rate_slabs: Vec<TaxRate>) -> DomainResult<Self> {
        if large_b2c_threshold < Decimal::ZERO {
            return Err(DomainError::validation(
                "large transaction threshold must not be negative",
            ));
        }
        if rate_slabs.is_empty() {
            return Err(DomainError::validation("at least one rate slab is required"));
        }
        Ok(Self {
            large_b2c_threshold,
            rate_slabs,
        })
    }

    pub fn calculator(&self) -> TaxBreakdownCalculator {
        TaxBreakdownCalculator::new(self.rate_slabs.iter().copied())
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet::standard(self)
    }
}

impl Default for JurisdictionRules {
    fn default() -> Self {
        Self {
            large_b2c_threshold: Decimal::from(250_000),
            rate_slabs: TaxBreakdownCalculator::with_standard_slabs().slabs().to_vec(),
        }
    }
}

/// Tagged predicate over a finalized invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum Predicate {
    /// Buyer holds a registration id and the invoice has positive taxable value.
    RegisteredWithTaxableValue,
    /// Unregistered buyer, inter-state supply, taxable value strictly above `threshold`.
    UnregisteredInterStateAbove { threshold: Decimal },
    /// Any unregistered buyer.
    Unregistered,
    /// Invoice type is export.
    ExportInvoice,
    /// No tax charged before rounding absorption (nil-rated or zero value).
    ZeroTax,
}

impl Predicate {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        let registered = invoice.buyer().is_registered();
        match self {
            Predicate::RegisteredWithTaxableValue => {
                registered && invoice.taxable_total() > Decimal::ZERO
            }
            Predicate::UnregisteredInterStateAbove { threshold } => {
                !registered && invoice.is_inter_state() && invoice.taxable_total() > *threshold
            }
            Predicate::Unregistered => !registered,
            Predicate::ExportInvoice => invoice.is_export(),
            Predicate::ZeroTax => invoice.tax().nominal_tax_total().is_zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Mutually exclusive with other `FirstMatch` rules; earlier rules win.
    FirstMatch,
    /// Applied whenever the predicate matches.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub predicate: Predicate,
    pub section: SectionKind,
    pub mode: RuleMode,
}

/// Ordered classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// The statutory priority order.
    pub fn standard(jurisdiction: &JurisdictionRules) -> Self {
        Self::new(vec![
            ClassificationRule {
                predicate: Predicate::RegisteredWithTaxableValue,
                section: SectionKind::RegisteredBusiness,
                mode: RuleMode::FirstMatch,
            },
            ClassificationRule {
                predicate: Predicate::UnregisteredInterStateAbove {
                    threshold: jurisdiction.large_b2c_threshold,
                },
                section: SectionKind::LargeUnregisteredInterstate,
                mode: RuleMode::FirstMatch,
            },
            ClassificationRule {
                predicate: Predicate::Unregistered,
                section: SectionKind::SmallUnregistered,
                mode: RuleMode::FirstMatch,
            },
            ClassificationRule {
                predicate: Predicate::ExportInvoice,
                section: SectionKind::Export,
                mode: RuleMode::Always,
            },
            ClassificationRule {
                predicate: Predicate::ZeroTax,
                section: SectionKind::NilOrExempt,
                mode: RuleMode::Always,
            },
        ])
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Sections `invoice` contributes to, in rule order. May be empty.
    pub fn sections_for(&self, invoice: &Invoice) -> Vec<SectionKind> {
        let mut exclusive_taken = false;
        let mut sections = Vec::new();
        for rule in &self.rules {
            if rule.mode == RuleMode::FirstMatch && exclusive_taken {
                continue;
            }
            if !rule.predicate.matches(invoice) {
                continue;
            }
            if rule.mode == RuleMode::FirstMatch {
                exclusive_taken = true;
            }
            if !sections.contains(&rule.section) {
                sections.push(rule.section);
            }
        }
        sections
    }
}
