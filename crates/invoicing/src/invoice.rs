use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstkit_core::{
    AggregateId, DomainError, DomainResult, Entity, Gstin, StateCode, TaxRate, TenantId, checked_mul,
};

use crate::numbering::{InvoiceNumber, SequenceScope};
use crate::tax::{ExportFlag, TaxBreakdown, TaxBreakdownCalculator};

/// Invoice identifier (tenant-scoped via the `tenant_id` field).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Statutory document type. Each type has its own numbering sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    /// Standard tax invoice for goods.
    Standard,
    Services,
    Export,
}

impl InvoiceType {
    pub fn letter(self) -> char {
        match self {
            InvoiceType::Standard => 'T',
            InvoiceType::Services => 'S',
            InvoiceType::Export => 'E',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'T' => Some(InvoiceType::Standard),
            'S' => Some(InvoiceType::Services),
            'E' => Some(InvoiceType::Export),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceType::Standard => "standard",
            InvoiceType::Services => "services",
            InvoiceType::Export => "export",
        }
    }
}

impl core::str::FromStr for InvoiceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(InvoiceType::Standard),
            "services" => Ok(InvoiceType::Services),
            "export" => Ok(InvoiceType::Export),
            other => Err(DomainError::validation(format!("unknown invoice type '{other}'"))),
        }
    }
}

/// Payment state, maintained by the surrounding system. Never affects tax fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

/// Buyer as seen by the tax engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub party_id: Option<AggregateId>,
    pub name: String,
    /// Absent for unregistered buyers.
    pub gstin: Option<Gstin>,
    /// Buyer jurisdiction; doubles as the place of supply.
    pub state_code: StateCode,
}

impl Buyer {
    pub fn is_registered(&self) -> bool {
        self.gstin.is_some()
    }
}

/// One line of an invoice. Manual lines carry no product reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub product_id: Option<AggregateId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    pub tax_rate: TaxRate,
}

impl InvoiceLine {
    /// Unit rate after the line discount.
    pub fn effective_rate(&self) -> DomainResult<Decimal> {
        let retained = Decimal::ONE - self.discount_percent / Decimal::ONE_HUNDRED;
        checked_mul(self.unit_rate, retained)
    }

    pub fn taxable_value(&self) -> DomainResult<Decimal> {
        checked_mul(self.quantity, self.effective_rate()?)
    }
}

/// Invoice as built interactively, before tax fields and number are frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftInvoice {
    pub tenant_id: TenantId,
    pub invoice_type: InvoiceType,
    pub invoice_date: NaiveDate,
    pub buyer: Buyer,
    pub lines: Vec<InvoiceLine>,
    #[serde(default)]
    pub reverse_charge: bool,
    /// Only meaningful for export invoices: tax paid, domestic-equivalent treatment.
    #[serde(default)]
    pub export_with_payment: bool,
}

impl DraftInvoice {
    pub fn export_flag(&self) -> ExportFlag {
        match (self.invoice_type, self.export_with_payment) {
            (InvoiceType::Export, false) => ExportFlag::Export,
            (InvoiceType::Export, true) => ExportFlag::ExportWithPayment,
            _ => ExportFlag::Domestic,
        }
    }

    /// Numbering scope this draft will be finalized into.
    pub fn sequence_scope(&self) -> SequenceScope {
        SequenceScope {
            tenant_id: self.tenant_id,
            invoice_type: self.invoice_type,
            year: self.invoice_date.year(),
        }
    }

    /// Freeze the draft: compute tax and attach the assigned number.
    pub fn finalize(
        self,
        invoice_id: InvoiceId,
        number: InvoiceNumber,
        seller_state: StateCode,
        calculator: &TaxBreakdownCalculator,
        finalized_at: DateTime<Utc>,
    ) -> DomainResult<Invoice> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot finalize invoice without lines"));
        }
        let scope = self.sequence_scope();
        if number.invoice_type() != scope.invoice_type || number.year() != scope.year {
            return Err(DomainError::invariant(format!(
                "invoice number {number} does not belong to scope {}/{}",
                scope.invoice_type.as_str(),
                scope.year
            )));
        }

        let tax = calculator.compute_invoice_tax(
            &self.lines,
            seller_state,
            self.buyer.state_code,
            self.export_flag(),
        )?;

        Ok(Invoice {
            id: invoice_id,
            tenant_id: self.tenant_id,
            number,
            invoice_type: self.invoice_type,
            invoice_date: self.invoice_date,
            seller_state,
            buyer: self.buyer,
            lines: self.lines,
            tax,
            reverse_charge: self.reverse_charge,
            export_with_payment: self.export_with_payment,
            payment_status: PaymentStatus::Unpaid,
            created_at: finalized_at,
        })
    }
}

/// Finalized invoice. Tax fields are frozen; only payment status may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: TenantId,
    number: InvoiceNumber,
    invoice_type: InvoiceType,
    invoice_date: NaiveDate,
    seller_state: StateCode,
    buyer: Buyer,
    lines: Vec<InvoiceLine>,
    tax: TaxBreakdown,
    reverse_charge: bool,
    export_with_payment: bool,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn number(&self) -> InvoiceNumber {
        self.number
    }

    pub fn invoice_type(&self) -> InvoiceType {
        self.invoice_type
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.invoice_date
    }

    pub fn seller_state(&self) -> StateCode {
        self.seller_state
    }

    pub fn buyer(&self) -> &Buyer {
        &self.buyer
    }

    pub fn place_of_supply(&self) -> StateCode {
        self.buyer.state_code
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn tax(&self) -> &TaxBreakdown {
        &self.tax
    }

    pub fn taxable_total(&self) -> Decimal {
        self.tax.taxable_total
    }

    pub fn grand_total(&self) -> Decimal {
        self.tax.grand_total
    }

    pub fn is_inter_state(&self) -> bool {
        self.tax.nature.is_inter_state()
    }

    pub fn is_export(&self) -> bool {
        self.invoice_type == InvoiceType::Export
    }

    pub fn reverse_charge(&self) -> bool {
        self.reverse_charge
    }

    pub fn export_with_payment(&self) -> bool {
        self.export_with_payment
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sequence_scope(&self) -> SequenceScope {
        SequenceScope {
            tenant_id: self.tenant_id,
            invoice_type: self.invoice_type,
            year: self.number.year(),
        }
    }

    /// Record payment state. Tax fields are left untouched.
    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = status;
        self
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
