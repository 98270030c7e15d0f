//! Invoicing domain module.
//!
//! Tax breakdown, document numbering and invoice finalization, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod invoice;
pub mod numbering;
pub mod tax;

pub use invoice::{
    Buyer, DraftInvoice, Invoice, InvoiceId, InvoiceLine, InvoiceType, PaymentStatus,
};
pub use numbering::{InvoiceNumber, InvoiceNumberSequencer, SequenceScope};
pub use tax::{ExportFlag, LineTax, SupplyNature, TaxBreakdown, TaxBreakdownCalculator};
