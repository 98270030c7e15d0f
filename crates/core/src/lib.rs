//! `gstkit-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the jurisdiction/period/money value
//! objects shared by the invoicing and returns crates.

pub mod entity;
pub mod error;
pub mod id;
pub mod jurisdiction;
pub mod money;
pub mod period;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
pub use jurisdiction::{Gstin, StateCode};
pub use money::{TaxRate, checked_add, checked_mul, checked_sum, round_to_integer, split_evenly};
pub use period::ReturnPeriod;
