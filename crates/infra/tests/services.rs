//! Service-level tests over the in-memory repositories.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use gstkit_core::{AggregateId, Gstin, ReturnPeriod, StateCode, TaxRate, TenantId};
use gstkit_infra::{
    EngineConfig, InMemoryFilingRepository, InMemoryInvoiceRepository, InvoiceRepository,
    InvoiceService, RepositoryError, ReturnService, ServiceError,
};
use gstkit_invoicing::{
    Buyer, DraftInvoice, Invoice, InvoiceId, InvoiceLine, InvoiceType, PaymentStatus, SequenceScope,
    TaxBreakdownCalculator,
};
use gstkit_returns::{
    DetailedFiling, Filing, FilingKind, FilingStatus, SectionKind, SummaryFiling, SupplyKey,
};

type Invoices = Arc<InMemoryInvoiceRepository>;
type Returns = ReturnService<
    Invoices,
    InMemoryFilingRepository<DetailedFiling>,
    InMemoryFilingRepository<SummaryFiling>,
>;

const HOME: &str = "27";

fn state(code: &str) -> StateCode {
    StateCode::new(code).unwrap()
}

fn period() -> ReturnPeriod {
    "202412".parse().unwrap()
}

fn registered(code: &str) -> Buyer {
    Buyer {
        party_id: Some(AggregateId::new()),
        name: "Acme Traders".to_string(),
        gstin: Some(Gstin::new(&format!("{code}AAPFU0939F1ZV")).unwrap()),
        state_code: state(code),
    }
}

fn unregistered(code: &str) -> Buyer {
    Buyer {
        party_id: None,
        name: "Walk-in".to_string(),
        gstin: None,
        state_code: state(code),
    }
}

fn draft(tenant_id: TenantId, buyer: Buyer, unit_rate: Decimal, rate: Decimal) -> DraftInvoice {
    DraftInvoice {
        tenant_id,
        invoice_type: InvoiceType::Standard,
        invoice_date: NaiveDate::from_ymd_opt(2024, 12, 12).unwrap(),
        buyer,
        lines: vec![InvoiceLine {
            line_no: 1,
            product_id: None,
            description: "goods".to_string(),
            quantity: Decimal::ONE,
            unit_rate,
            discount_percent: Decimal::ZERO,
            tax_rate: TaxRate::new(rate).unwrap(),
        }],
        reverse_charge: false,
        export_with_payment: false,
    }
}

fn engine() -> (InvoiceService<Invoices>, Returns) {
    gstkit_observability::init();
    let config = EngineConfig::default();
    let invoices: Invoices = Arc::new(InMemoryInvoiceRepository::new());
    let invoice_service = InvoiceService::from_config(invoices.clone(), &config).unwrap();
    let return_service = ReturnService::from_config(
        invoices,
        InMemoryFilingRepository::new(),
        InMemoryFilingRepository::new(),
        &config,
    )
    .unwrap();
    (invoice_service, return_service)
}

#[tokio::test]
async fn inter_state_invoice_is_numbered_and_taxed() {
    let (invoices, _) = engine();
    let tenant = TenantId::new();

    let inv = invoices
        .finalize(draft(tenant, registered("29"), dec!(1000), dec!(18)), state(HOME))
        .await
        .unwrap();

    assert_eq!(inv.number().to_string(), "T-INV-2024-0001");
    assert_eq!(inv.tax().igst_total, dec!(180.00));
    assert_eq!(inv.grand_total(), dec!(1180));
    assert_eq!(invoices.get(tenant, inv.id_typed()).await.unwrap(), inv);
}

#[tokio::test]
async fn intra_state_round_off_is_split() {
    let (invoices, _) = engine();
    let tenant = TenantId::new();

    let inv = invoices
        .finalize(draft(tenant, unregistered(HOME), dec!(100.005), dec!(18)), state(HOME))
        .await
        .unwrap();

    let tax = inv.tax();
    assert_eq!(tax.exact_total(), dec!(118.0059));
    assert_eq!(tax.round_off, dec!(-0.0059));
    assert_eq!(tax.cgst_total, dec!(8.99755));
    assert_eq!(tax.sgst_total, dec!(8.99745));
    assert_eq!(tax.taxable_total + tax.cgst_total + tax.sgst_total, dec!(118));
}

#[tokio::test]
async fn numbering_is_scoped_by_tenant_and_type() {
    let (invoices, _) = engine();
    let tenant = TenantId::new();
    let other = TenantId::new();

    let first = invoices
        .finalize(draft(tenant, registered("29"), dec!(10), dec!(5)), state(HOME))
        .await
        .unwrap();
    let second = invoices
        .finalize(draft(tenant, registered("29"), dec!(10), dec!(5)), state(HOME))
        .await
        .unwrap();
    let mut services = draft(tenant, registered("29"), dec!(10), dec!(5));
    services.invoice_type = InvoiceType::Services;
    let services = invoices.finalize(services, state(HOME)).await.unwrap();
    let foreign = invoices
        .finalize(draft(other, registered("29"), dec!(10), dec!(5)), state(HOME))
        .await
        .unwrap();

    assert_eq!(first.number().to_string(), "T-INV-2024-0001");
    assert_eq!(second.number().to_string(), "T-INV-2024-0002");
    assert_eq!(services.number().to_string(), "S-INV-2024-0001");
    assert_eq!(foreign.number().to_string(), "T-INV-2024-0001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_finalizations_never_share_a_number() {
    gstkit_observability::init();
    let repo: Invoices = Arc::new(InMemoryInvoiceRepository::new());
    let service = Arc::new(InvoiceService::new(
        repo.clone(),
        TaxBreakdownCalculator::with_standard_slabs(),
        16,
    ));
    let tenant = TenantId::new();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .finalize(draft(tenant, registered("29"), dec!(100), dec!(12)), state(HOME))
                    .await
            })
        })
        .collect();

    let mut sequences = BTreeSet::new();
    for handle in handles {
        let inv = handle.await.unwrap().unwrap();
        assert!(sequences.insert(inv.number().sequence()), "duplicate {}", inv.number());
    }
    assert_eq!(sequences, (1..=16).collect::<BTreeSet<u32>>());
}

/// Every insert loses to a concurrent writer.
struct AlwaysTaken;

#[async_trait]
impl InvoiceRepository for AlwaysTaken {
    async fn count_in_scope(&self, _: &SequenceScope) -> Result<u32, RepositoryError> {
        Ok(0)
    }

    async fn insert_finalized(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict(format!("{} taken", invoice.number())))
    }

    async fn get(&self, _: TenantId, _: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        Ok(None)
    }

    async fn find_by_period(&self, _: TenantId, _: ReturnPeriod) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(vec![])
    }

    async fn update_payment_status(
        &self,
        _: TenantId,
        _: InvoiceId,
        _: PaymentStatus,
    ) -> Result<Option<Invoice>, RepositoryError> {
        Ok(None)
    }
}

#[tokio::test]
async fn finalization_gives_up_with_concurrency_conflict() {
    let service = InvoiceService::new(AlwaysTaken, TaxBreakdownCalculator::with_standard_slabs(), 3);
    let err = service
        .finalize(draft(TenantId::new(), registered("29"), dec!(1), dec!(5)), state(HOME))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ConcurrencyConflict(_)));
}

#[tokio::test]
async fn rejected_drafts_write_nothing() {
    let (invoices, _) = engine();
    let tenant = TenantId::new();

    let mut negative = draft(tenant, registered("29"), dec!(10), dec!(5));
    negative.lines[0].quantity = dec!(-1);
    let err = invoices.finalize(negative, state(HOME)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let mut off_slab = draft(tenant, registered("29"), dec!(10), dec!(5));
    off_slab.lines[0].tax_rate = TaxRate::new(dec!(7)).unwrap();
    let err = invoices.finalize(off_slab, state(HOME)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let mut empty = draft(tenant, registered("29"), dec!(10), dec!(5));
    empty.lines.clear();
    let scope = empty.sequence_scope();
    let err = invoices.finalize(empty, state(HOME)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert_eq!(invoices.repository().count_in_scope(&scope).await.unwrap(), 0);
}

#[tokio::test]
async fn payment_status_can_change_after_finalization() {
    let (invoices, _) = engine();
    let tenant = TenantId::new();
    let inv = invoices
        .finalize(draft(tenant, registered("29"), dec!(500), dec!(28)), state(HOME))
        .await
        .unwrap();

    let paid = invoices
        .set_payment_status(tenant, inv.id_typed(), PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.payment_status(), PaymentStatus::Paid);
    assert_eq!(paid.grand_total(), inv.grand_total());

    let missing = invoices
        .set_payment_status(tenant, InvoiceId::new(AggregateId::new()), PaymentStatus::Paid)
        .await
        .unwrap_err();
    assert!(matches!(missing, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn registered_and_large_unregistered_invoices_land_in_their_sections() {
    let (invoices, returns) = engine();
    let tenant = TenantId::new();

    let registered_inv = invoices
        .finalize(draft(tenant, registered("29"), dec!(50000), dec!(18)), state(HOME))
        .await
        .unwrap();
    let large_inv = invoices
        .finalize(draft(tenant, unregistered("07"), dec!(300000), dec!(5)), state(HOME))
        .await
        .unwrap();
    let small_inv = invoices
        .finalize(draft(tenant, unregistered("07"), dec!(1000), dec!(5)), state(HOME))
        .await
        .unwrap();

    let filing = returns.generate_detailed_filing(tenant, period()).await.unwrap();
    assert_eq!(filing.invoice_count(), 3);
    assert_eq!(filing.status(), FilingStatus::Draft);

    let covering = |section: SectionKind| -> Vec<String> {
        filing
            .rows_in(section)
            .flat_map(|r| r.invoices.iter().map(|n| n.to_string()))
            .collect()
    };
    assert_eq!(covering(SectionKind::RegisteredBusiness), vec![registered_inv.number().to_string()]);
    assert_eq!(covering(SectionKind::LargeUnregisteredInterstate), vec![large_inv.number().to_string()]);
    assert_eq!(covering(SectionKind::SmallUnregistered), vec![small_inv.number().to_string()]);
}

#[tokio::test]
async fn second_detailed_generation_is_a_duplicate() {
    let (invoices, returns) = engine();
    let tenant = TenantId::new();
    invoices
        .finalize(draft(tenant, registered("29"), dec!(1000), dec!(18)), state(HOME))
        .await
        .unwrap();

    let first = returns.generate_detailed_filing(tenant, period()).await.unwrap();

    // a later invoice must not leak into the already generated filing
    invoices
        .finalize(draft(tenant, unregistered("29"), dec!(10), dec!(18)), state(HOME))
        .await
        .unwrap();
    let err = returns.generate_detailed_filing(tenant, period()).await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateFiling(_)));

    let stored = returns.detailed_filing(tenant, period()).await.unwrap();
    assert_eq!(stored, first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_detailed_generations_store_exactly_one_filing() {
    let (invoices, returns) = engine();
    let returns = Arc::new(returns);
    let tenant = TenantId::new();
    for buyer in [registered("29"), unregistered(HOME), unregistered("07")] {
        invoices
            .finalize(draft(tenant, buyer, dec!(500), dec!(12)), state(HOME))
            .await
            .unwrap();
    }

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let returns = returns.clone();
            tokio::spawn(async move { returns.generate_detailed_filing(tenant, period()).await })
        })
        .collect();

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(filing) => winners.push(filing),
            Err(ServiceError::DuplicateFiling(_) | ServiceError::ConcurrencyConflict(_)) => losers += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(losers, 1);

    let winner = winners.remove(0);
    let stored = returns.detailed_filing(tenant, period()).await.unwrap();
    assert_eq!(stored.id_typed(), winner.id_typed());
    assert_eq!(stored.rows(), winner.rows());
    assert_eq!(stored.invoice_count(), 3);
}

#[tokio::test]
async fn summary_requires_detailed_filing_and_is_generated_once() {
    let (invoices, returns) = engine();
    let tenant = TenantId::new();
    invoices
        .finalize(draft(tenant, registered("29"), dec!(1000), dec!(18)), state(HOME))
        .await
        .unwrap();
    invoices
        .finalize(draft(tenant, unregistered("29"), dec!(200), dec!(18)), state(HOME))
        .await
        .unwrap();

    let err = returns.generate_summary_filing(tenant, period()).await.unwrap_err();
    assert!(matches!(err, ServiceError::MissingPrerequisite(_)));

    let detailed = returns.generate_detailed_filing(tenant, period()).await.unwrap();
    let summary = returns.generate_summary_filing(tenant, period()).await.unwrap();
    assert_eq!(summary.detailed_filing_id(), detailed.id_typed());

    let outward = summary.outward_total(SupplyKey::PlaceOfSupply(state("29"))).unwrap();
    assert_eq!(outward.amounts.igst, dec!(180));
    let small = summary.small_unregistered_total(state("29")).unwrap();
    assert_eq!(small.amounts.igst, dec!(36));

    let err = returns.generate_summary_filing(tenant, period()).await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateFiling(_)));
}

#[tokio::test]
async fn empty_period_yields_an_empty_filing() {
    let (_, returns) = engine();
    let tenant = TenantId::new();

    let filing = returns.generate_detailed_filing(tenant, period()).await.unwrap();
    assert_eq!(filing.invoice_count(), 0);
    assert!(filing.rows().is_empty());
}

#[tokio::test]
async fn filings_are_tenant_isolated() {
    let (invoices, returns) = engine();
    let tenant = TenantId::new();
    let other = TenantId::new();
    invoices
        .finalize(draft(tenant, registered("29"), dec!(1000), dec!(18)), state(HOME))
        .await
        .unwrap();

    returns.generate_detailed_filing(tenant, period()).await.unwrap();
    let theirs = returns.generate_detailed_filing(other, period()).await.unwrap();
    assert_eq!(theirs.invoice_count(), 0);
}

#[tokio::test]
async fn filing_status_follows_lifecycle() {
    let (_, returns) = engine();
    let tenant = TenantId::new();

    let err = returns
        .transition_status(FilingKind::Detailed, tenant, period(), FilingStatus::Filed)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    returns.generate_detailed_filing(tenant, period()).await.unwrap();

    let err = returns
        .transition_status(FilingKind::Detailed, tenant, period(), FilingStatus::Amended)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvariantViolation(_)));

    let status = returns
        .transition_status(FilingKind::Detailed, tenant, period(), FilingStatus::Filed)
        .await
        .unwrap();
    assert_eq!(status, FilingStatus::Filed);
    let status = returns
        .transition_status(FilingKind::Detailed, tenant, period(), FilingStatus::Amended)
        .await
        .unwrap();
    assert_eq!(status, FilingStatus::Amended);

    let stored = returns.detailed_filing(tenant, period()).await.unwrap();
    assert_eq!(stored.status(), FilingStatus::Amended);
}
