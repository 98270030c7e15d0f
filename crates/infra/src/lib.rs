//! Infrastructure layer: configuration, repositories and application services.
//!
//! The domain crates stay free of IO; this crate wires them to storage through the
//! [`repository`] traits, with in-memory and Postgres implementations.

pub mod config;
pub mod error;
pub mod repository;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use error::{RepositoryError, ServiceError};
pub use repository::{
    FilingRepository, InMemoryFilingRepository, InMemoryInvoiceRepository, InvoiceRepository,
    PersistedFiling, PostgresFilingRepository, PostgresInvoiceRepository, apply_schema,
};
pub use service::{InvoiceService, ReturnService};
