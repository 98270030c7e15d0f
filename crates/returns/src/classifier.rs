//! Period classification: finalized invoices -> detailed-filing section rows.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use gstkit_core::{DomainError, DomainResult, ReturnPeriod, TaxRate, TenantId};
use gstkit_invoicing::Invoice;

use crate::filing::{DetailedFiling, FilingId, FilingStatus};
use crate::rules::{JurisdictionRules, RuleSet};
use crate::section::{InvoiceDetail, NilCategory, SectionAmounts, SectionKey, SectionKind, SectionRow};

/// Builds one detailed filing from a closed period's invoices.
///
/// Accumulation is a fold into a map local to each call; nothing survives between runs.
#[derive(Debug, Clone)]
pub struct ReturnClassifier {
    rules: RuleSet,
}

impl ReturnClassifier {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn for_jurisdiction(jurisdiction: &JurisdictionRules) -> Self {
        Self::new(jurisdiction.rule_set())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Classify every invoice of `period` for `tenant_id`.
    ///
    /// Rejects invoices from another tenant or outside the period, duplicate
    /// invoices, and any invoice no rule claims. Either every invoice is
    /// classified or nothing is returned.
    pub fn classify(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
        invoices: &[Invoice],
        filing_id: FilingId,
        generated_at: DateTime<Utc>,
    ) -> DomainResult<DetailedFiling> {
        let mut ordered: Vec<&Invoice> = invoices.iter().collect();
        ordered.sort_by_key(|i| (i.invoice_date(), i.number()));

        let mut seen = HashSet::with_capacity(ordered.len());
        let mut rows: BTreeMap<(SectionKind, SectionKey), SectionRow> = BTreeMap::new();

        for invoice in ordered {
            if invoice.tenant_id() != tenant_id {
                return Err(DomainError::invariant(format!(
                    "invoice {} belongs to another tenant",
                    invoice.number()
                )));
            }
            if !period.contains(invoice.invoice_date()) {
                return Err(DomainError::validation(format!(
                    "invoice {} dated {} is outside period {period}",
                    invoice.number(),
                    invoice.invoice_date()
                )));
            }
            if !seen.insert(invoice.number()) {
                return Err(DomainError::validation(format!(
                    "invoice {} appears more than once",
                    invoice.number()
                )));
            }

            let sections = self.rules.sections_for(invoice);
            if sections.is_empty() {
                return Err(DomainError::invariant(format!(
                    "invoice {} matched no return section",
                    invoice.number()
                )));
            }

            for section in sections {
                for (key, amounts) in contributions(section, invoice)? {
                    let detail = per_invoice(section).then(|| detail_of(invoice));
                    rows.entry((section, key.clone()))
                        .or_insert_with(|| SectionRow::new(section, key, detail))
                        .accumulate(amounts, invoice.number())?;
                }
            }
        }

        Ok(DetailedFiling {
            id: filing_id,
            tenant_id,
            period,
            status: FilingStatus::Draft,
            generated_at,
            invoice_count: seen.len(),
            rows: rows.into_values().collect(),
        })
    }
}

fn per_invoice(section: SectionKind) -> bool {
    matches!(
        section,
        SectionKind::RegisteredBusiness
            | SectionKind::LargeUnregisteredInterstate
            | SectionKind::Export
    )
}

fn detail_of(invoice: &Invoice) -> InvoiceDetail {
    InvoiceDetail {
        invoice_date: invoice.invoice_date(),
        invoice_value: invoice.grand_total(),
        reverse_charge: invoice.reverse_charge(),
        export_with_payment: invoice.export_with_payment(),
    }
}

/// What `invoice` adds to `section`, keyed by row.
fn contributions(section: SectionKind, invoice: &Invoice) -> DomainResult<Vec<(SectionKey, SectionAmounts)>> {
    Ok(match section {
        SectionKind::RegisteredBusiness
        | SectionKind::LargeUnregisteredInterstate
        | SectionKind::Export => vec![(
            SectionKey::Invoice {
                invoice_number: invoice.number(),
                place_of_supply: invoice.place_of_supply(),
                counterparty: invoice.buyer().gstin.clone(),
            },
            SectionAmounts::of_invoice(invoice.tax()),
        )],
        SectionKind::SmallUnregistered => {
            let mut by_rate: BTreeMap<TaxRate, SectionAmounts> = BTreeMap::new();
            for line in &invoice.tax().lines {
                let bucket = by_rate.entry(line.tax_rate).or_default();
                *bucket = bucket.checked_add(SectionAmounts::of_line(line))?;
            }
            by_rate
                .into_iter()
                .map(|(rate, amounts)| {
                    (
                        SectionKey::RateBucket {
                            place_of_supply: invoice.place_of_supply(),
                            rate,
                        },
                        amounts,
                    )
                })
                .collect()
        }
        SectionKind::NilOrExempt => vec![(
            SectionKey::NilBucket {
                category: NilCategory::of(invoice.is_inter_state(), invoice.buyer().is_registered()),
            },
            SectionAmounts::of_invoice(invoice.tax()),
        )],
    })
}
