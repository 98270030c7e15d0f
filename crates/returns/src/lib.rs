//! Statutory returns domain module.
//!
//! Classifies a period's finalized invoices into the sections of the detailed
//! (sales) return and derives the summary (liability) return from those sections.
//! Pure domain logic: persistence and atomicity live in `gstkit-infra`.

pub mod aggregator;
pub mod classifier;
pub mod filing;
pub mod rules;
pub mod section;

pub use aggregator::{PlaceOfSupplyTotal, ReturnAggregator, SummaryFiling, SupplyKey};
pub use classifier::ReturnClassifier;
pub use filing::{DetailedFiling, Filing, FilingId, FilingKind, FilingStatus};
pub use rules::{ClassificationRule, JurisdictionRules, Predicate, RuleMode, RuleSet};
pub use section::{InvoiceDetail, NilCategory, SectionAmounts, SectionKey, SectionKind, SectionRow};

#[cfg(test)]
mod test_support;
