//! Application services.
//!
//! Services compose the pure domain crates with injected repositories and enforce
//! the storage-level atomicity rules: invoice numbers are assigned by a
//! read-then-insert step backed by a uniqueness constraint, and each filing is
//! written once per tenant and period.

pub mod invoices;
pub mod returns;

pub use invoices::InvoiceService;
pub use returns::ReturnService;
