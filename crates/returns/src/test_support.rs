//! Invoice fixtures shared by the classifier and aggregator tests.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use gstkit_core::{AggregateId, Gstin, ReturnPeriod, StateCode, TaxRate, TenantId};
use gstkit_invoicing::{
    Buyer, DraftInvoice, Invoice, InvoiceId, InvoiceLine, InvoiceNumberSequencer, InvoiceType,
    TaxBreakdownCalculator,
};

pub const HOME: &str = "27";

pub fn state(code: &str) -> StateCode {
    StateCode::new(code).unwrap()
}

pub fn rate(percent: Decimal) -> TaxRate {
    TaxRate::new(percent).unwrap()
}

pub fn period() -> ReturnPeriod {
    "202412".parse().unwrap()
}

pub fn registered_buyer(code: &str) -> Buyer {
    Buyer {
        party_id: Some(AggregateId::new()),
        name: "Registered Buyer".to_string(),
        gstin: Some(Gstin::new(&format!("{code}AAPFU0939F1ZV")).unwrap()),
        state_code: state(code),
    }
}

pub fn unregistered_buyer(code: &str) -> Buyer {
    Buyer {
        party_id: None,
        name: "Walk-in".to_string(),
        gstin: None,
        state_code: state(code),
    }
}

/// Finalizes invoices for one tenant with per-type sequential numbers.
pub struct Fixture {
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    counts: HashMap<InvoiceType, u32>,
    calculator: TaxBreakdownCalculator,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tenant_id: TenantId::new(),
            date: NaiveDate::from_ymd_opt(2024, 12, 15).unwrap(),
            counts: HashMap::new(),
            calculator: TaxBreakdownCalculator::with_standard_slabs(),
        }
    }

    /// One line per `(taxable, rate)` pair, quantity 1.
    pub fn invoice(&mut self, invoice_type: InvoiceType, buyer: Buyer, lines: &[(Decimal, Decimal)]) -> Invoice {
        let draft = DraftInvoice {
            tenant_id: self.tenant_id,
            invoice_type,
            invoice_date: self.date,
            buyer,
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, (taxable, percent))| InvoiceLine {
                    line_no: i as u32 + 1,
                    product_id: None,
                    description: format!("item {}", i + 1),
                    quantity: Decimal::ONE,
                    unit_rate: *taxable,
                    discount_percent: Decimal::ZERO,
                    tax_rate: rate(*percent),
                })
                .collect(),
            reverse_charge: false,
            export_with_payment: false,
        };

        let count = self.counts.entry(invoice_type).or_insert(0);
        let number = InvoiceNumberSequencer
            .next(&draft.sequence_scope(), *count)
            .unwrap();
        *count += 1;

        draft
            .finalize(
                InvoiceId::new(AggregateId::new()),
                number,
                state(HOME),
                &self.calculator,
                Utc::now(),
            )
            .unwrap()
    }

    pub fn from_shape(&mut self, shape: &InvoiceShape) -> Invoice {
        let code = ["27", "29", "07"][shape.state];
        let buyer = if shape.registered {
            registered_buyer(code)
        } else {
            unregistered_buyer(code)
        };
        let invoice_type = [InvoiceType::Standard, InvoiceType::Services, InvoiceType::Export][shape.invoice_type];
        let slabs = [dec!(0), dec!(5), dec!(12), dec!(18), dec!(28)];
        let lines: Vec<(Decimal, Decimal)> = shape
            .lines
            .iter()
            .map(|(paise, slab)| (Decimal::new(*paise, 2), slabs[*slab]))
            .collect();
        self.invoice(invoice_type, buyer, &lines)
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceShape {
    pub registered: bool,
    pub state: usize,
    pub invoice_type: usize,
    pub lines: Vec<(i64, usize)>,
}

pub fn arb_invoice_shape() -> impl Strategy<Value = InvoiceShape> {
    (
        any::<bool>(),
        0usize..3,
        0usize..3,
        prop::collection::vec((0i64..40_000_000, 0usize..5), 1..4),
    )
        .prop_map(|(registered, state, invoice_type, lines)| InvoiceShape {
            registered,
            state,
            invoice_type,
            lines,
        })
}
