//! Summary (liability) return derived from a detailed filing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gstkit_core::{DomainError, DomainResult, Entity, ReturnPeriod, StateCode, TenantId};

use crate::filing::{DetailedFiling, Filing, FilingId, FilingKind, FilingStatus};
use crate::section::{SectionAmounts, SectionKind, SectionRow};

/// Grouping key of summary totals. Exports carry no place of supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "place_of_supply", rename_all = "snake_case")]
pub enum SupplyKey {
    PlaceOfSupply(StateCode),
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOfSupplyTotal {
    pub key: SupplyKey,
    pub amounts: SectionAmounts,
    /// Detailed-filing rows folded into this total.
    pub row_count: usize,
}

/// Summary return for one tenant and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryFiling {
    id: FilingId,
    tenant_id: TenantId,
    period: ReturnPeriod,
    status: FilingStatus,
    generated_at: DateTime<Utc>,
    detailed_filing_id: FilingId,
    outward_taxable: Vec<PlaceOfSupplyTotal>,
    small_unregistered: Vec<PlaceOfSupplyTotal>,
    nil_exempt: SectionAmounts,
}

impl SummaryFiling {
    pub fn id_typed(&self) -> FilingId {
        self.id
    }

    /// The detailed filing these totals were derived from.
    pub fn detailed_filing_id(&self) -> FilingId {
        self.detailed_filing_id
    }

    /// Registered-business, large unregistered and export rows by place of supply.
    pub fn outward_taxable(&self) -> &[PlaceOfSupplyTotal] {
        &self.outward_taxable
    }

    /// Small unregistered rows by place of supply (rates flattened).
    pub fn small_unregistered(&self) -> &[PlaceOfSupplyTotal] {
        &self.small_unregistered
    }

    pub fn nil_exempt(&self) -> SectionAmounts {
        self.nil_exempt
    }

    pub fn outward_total(&self, key: SupplyKey) -> Option<&PlaceOfSupplyTotal> {
        self.outward_taxable.iter().find(|t| t.key == key)
    }

    pub fn small_unregistered_total(&self, place_of_supply: StateCode) -> Option<&PlaceOfSupplyTotal> {
        self.small_unregistered
            .iter()
            .find(|t| t.key == SupplyKey::PlaceOfSupply(place_of_supply))
    }
}

impl Entity for SummaryFiling {
    type Id = FilingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Filing for SummaryFiling {
    const KIND: FilingKind = FilingKind::Summary;

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn period(&self) -> ReturnPeriod {
        self.period
    }

    fn status(&self) -> FilingStatus {
        self.status
    }

    fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    fn with_status(mut self, status: FilingStatus) -> Self {
        self.status = status;
        self
    }
}

/// Derives a [`SummaryFiling`] entirely from a [`DetailedFiling`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ReturnAggregator;

impl ReturnAggregator {
    /// Aggregate the detailed filing of (`tenant_id`, `period`).
    ///
    /// `detailed` is `None` when no detailed filing exists yet, which is rejected
    /// as a missing prerequisite.
    pub fn generate(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
        detailed: Option<&DetailedFiling>,
        filing_id: FilingId,
        generated_at: DateTime<Utc>,
    ) -> DomainResult<SummaryFiling> {
        let detailed = detailed.ok_or_else(|| {
            DomainError::missing_prerequisite(format!(
                "no detailed filing exists for period {period}"
            ))
        })?;
        if detailed.tenant_id() != tenant_id || detailed.period() != period {
            return Err(DomainError::invariant(format!(
                "detailed filing {} does not belong to tenant/period {period}",
                detailed.id_typed()
            )));
        }

        let mut outward: BTreeMap<SupplyKey, PlaceOfSupplyTotal> = BTreeMap::new();
        let mut small: BTreeMap<SupplyKey, PlaceOfSupplyTotal> = BTreeMap::new();
        let mut nil_exempt = SectionAmounts::default();

        for row in detailed.rows() {
            match row.section {
                SectionKind::RegisteredBusiness | SectionKind::LargeUnregisteredInterstate => {
                    fold(&mut outward, place_key(row)?, row)?;
                }
                SectionKind::Export => fold(&mut outward, SupplyKey::Export, row)?,
                SectionKind::SmallUnregistered => fold(&mut small, place_key(row)?, row)?,
                SectionKind::NilOrExempt => nil_exempt = nil_exempt.checked_add(row.amounts)?,
            }
        }

        Ok(SummaryFiling {
            id: filing_id,
            tenant_id,
            period,
            status: FilingStatus::Draft,
            generated_at,
            detailed_filing_id: detailed.id_typed(),
            outward_taxable: outward.into_values().collect(),
            small_unregistered: small.into_values().collect(),
            nil_exempt,
        })
    }
}

fn place_key(row: &SectionRow) -> DomainResult<SupplyKey> {
    row.key
        .place_of_supply()
        .map(SupplyKey::PlaceOfSupply)
        .ok_or_else(|| {
            DomainError::invariant(format!(
                "{} row has no place of supply",
                row.section.as_str()
            ))
        })
}

fn fold(
    totals: &mut BTreeMap<SupplyKey, PlaceOfSupplyTotal>,
    key: SupplyKey,
    row: &SectionRow,
) -> DomainResult<()> {
    let total = totals.entry(key).or_insert_with(|| PlaceOfSupplyTotal {
        key,
        amounts: SectionAmounts::default(),
        row_count: 0,
    });
    total.amounts = total.amounts.checked_add(row.amounts)?;
    total.row_count += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ReturnClassifier;
    use crate::rules::JurisdictionRules;
    use crate::test_support::*;
    use gstkit_core::AggregateId;
    use gstkit_invoicing::{Invoice, InvoiceType};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn detailed(tenant: TenantId, invoices: &[Invoice]) -> DetailedFiling {
        ReturnClassifier::for_jurisdiction(&JurisdictionRules::default())
            .classify(tenant, period(), invoices, FilingId::new(AggregateId::new()), Utc::now())
            .unwrap()
    }

    fn summarize(tenant: TenantId, detailed: Option<&DetailedFiling>) -> DomainResult<SummaryFiling> {
        ReturnAggregator.generate(
            tenant,
            period(),
            detailed,
            FilingId::new(AggregateId::new()),
            Utc::now(),
        )
    }

    #[test]
    fn outward_supplies_are_grouped_by_place_with_exports_apart() {
        let mut fx = Fixture::new();
        let mut foreign = registered_buyer("29");
        foreign.state_code = StateCode::FOREIGN;
        let invoices = vec![
            fx.invoice(InvoiceType::Standard, registered_buyer("29"), &[(dec!(1000), dec!(18))]),
            fx.invoice(InvoiceType::Services, registered_buyer("29"), &[(dec!(2000), dec!(18))]),
            fx.invoice(InvoiceType::Standard, unregistered_buyer("07"), &[(dec!(300000), dec!(5))]),
            fx.invoice(InvoiceType::Export, foreign, &[(dec!(5000), dec!(0))]),
        ];

        let d = detailed(fx.tenant_id, &invoices);
        let s = summarize(fx.tenant_id, Some(&d)).unwrap();

        let pos_29 = s.outward_total(SupplyKey::PlaceOfSupply(state("29"))).unwrap();
        assert_eq!(pos_29.amounts.taxable_value, dec!(3000));
        assert_eq!(pos_29.amounts.igst, dec!(540));
        assert_eq!(pos_29.row_count, 2);

        let pos_07 = s.outward_total(SupplyKey::PlaceOfSupply(state("07"))).unwrap();
        assert_eq!(pos_07.amounts.taxable_value, dec!(300000));

        let export = s.outward_total(SupplyKey::Export).unwrap();
        assert_eq!(export.amounts.taxable_value, dec!(5000));

        // the export's registered-business row is keyed by its own place of supply
        assert!(s.outward_total(SupplyKey::PlaceOfSupply(StateCode::FOREIGN)).is_some());
        assert_eq!(s.nil_exempt().taxable_value, dec!(5000));
        assert_eq!(s.status(), FilingStatus::Draft);
        assert_eq!(s.detailed_filing_id(), d.id_typed());
    }

    #[test]
    fn small_unregistered_rates_are_flattened_per_place() {
        let mut fx = Fixture::new();
        let invoices = vec![
            fx.invoice(InvoiceType::Standard, unregistered_buyer("29"), &[(dec!(100), dec!(5))]),
            fx.invoice(
                InvoiceType::Standard,
                unregistered_buyer("29"),
                &[(dec!(200), dec!(12)), (dec!(300), dec!(18))],
            ),
            fx.invoice(InvoiceType::Standard, unregistered_buyer(HOME), &[(dec!(50), dec!(18))]),
        ];

        let d = detailed(fx.tenant_id, &invoices);
        assert_eq!(d.rows_in(SectionKind::SmallUnregistered).count(), 4);
        let s = summarize(fx.tenant_id, Some(&d)).unwrap();

        assert_eq!(s.small_unregistered().len(), 2);
        let pos_29 = s.small_unregistered_total(state("29")).unwrap();
        assert_eq!(pos_29.amounts.taxable_value, dec!(600));
        assert_eq!(pos_29.row_count, 3);
        let home = s.small_unregistered_total(state(HOME)).unwrap();
        assert_eq!(home.amounts.taxable_value, dec!(50));
        assert_eq!(home.amounts.igst, dec!(0));
        assert_eq!(home.amounts.cgst, dec!(4.5));
    }

    #[test]
    fn missing_detailed_filing_is_rejected() {
        let err = summarize(TenantId::new(), None).unwrap_err();
        assert!(matches!(err, DomainError::MissingPrerequisite(_)));
    }

    #[test]
    fn detailed_filing_of_other_tenant_is_rejected() {
        let mut fx = Fixture::new();
        let invoices = vec![fx.invoice(InvoiceType::Standard, registered_buyer("29"), &[(dec!(1), dec!(5))])];
        let d = detailed(fx.tenant_id, &invoices);

        let err = summarize(TenantId::new(), Some(&d)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: for every place of supply, summary totals equal the sum of the
        /// matching detailed-filing rows.
        #[test]
        fn summary_totals_match_detailed_rows(shapes in prop::collection::vec(arb_invoice_shape(), 0..25)) {
            let mut fx = Fixture::new();
            let invoices: Vec<Invoice> = shapes.iter().map(|s| fx.from_shape(s)).collect();
            let d = detailed(fx.tenant_id, &invoices);
            let s = summarize(fx.tenant_id, Some(&d)).unwrap();

            for total in s.outward_taxable() {
                let matching = d.rows().iter().filter(|r| match total.key {
                    SupplyKey::Export => r.section == SectionKind::Export,
                    SupplyKey::PlaceOfSupply(pos) => matches!(
                        r.section,
                        SectionKind::RegisteredBusiness | SectionKind::LargeUnregisteredInterstate
                    ) && r.key.place_of_supply() == Some(pos),
                });
                let expected = SectionAmounts::try_sum(matching.map(|r| r.amounts)).unwrap();
                prop_assert_eq!(total.amounts, expected);
            }

            for total in s.small_unregistered() {
                let matching = d
                    .rows_in(SectionKind::SmallUnregistered)
                    .filter(|r| SupplyKey::PlaceOfSupply(r.key.place_of_supply().unwrap()) == total.key);
                let expected = SectionAmounts::try_sum(matching.map(|r| r.amounts)).unwrap();
                prop_assert_eq!(total.amounts, expected);
            }

            prop_assert_eq!(s.nil_exempt(), d.section_totals(SectionKind::NilOrExempt).unwrap());

            let outward_rows: usize = s.outward_taxable().iter().map(|t| t.row_count).sum();
            let expected_rows = d.rows_in(SectionKind::RegisteredBusiness).count()
                + d.rows_in(SectionKind::LargeUnregisteredInterstate).count()
                + d.rows_in(SectionKind::Export).count();
            prop_assert_eq!(outward_rows, expected_rows);
        }
    }
}
