//! Storage boundary for invoices and filings.
//!
//! Repositories are tenant-scoped: every operation takes the tenant explicitly and
//! never returns another tenant's records. Uniqueness backstops live here, not in the
//! services: `(tenant, type, year, sequence)` for invoices and `(tenant, period)`
//! per filing kind.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use gstkit_core::{ReturnPeriod, TenantId};
use gstkit_invoicing::{Invoice, InvoiceId, PaymentStatus, SequenceScope};
use gstkit_returns::{DetailedFiling, Filing, FilingStatus, SectionRow, SummaryFiling};

use crate::error::RepositoryError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryFilingRepository, InMemoryInvoiceRepository};
pub use postgres::{PostgresFilingRepository, PostgresInvoiceRepository, apply_schema};

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Number of finalized invoices already persisted in `scope`.
    async fn count_in_scope(&self, scope: &SequenceScope) -> Result<u32, RepositoryError>;

    /// Persist a finalized invoice.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the number is already taken in
    /// its scope; nothing is written in that case.
    async fn insert_finalized(&self, invoice: &Invoice) -> Result<(), RepositoryError>;

    async fn get(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError>;

    /// Finalized invoices dated within `period`, ordered by (date, number).
    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Vec<Invoice>, RepositoryError>;

    /// Replace the payment status, leaving every tax field untouched.
    ///
    /// Returns `None` when the invoice does not exist for this tenant.
    async fn update_payment_status(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Option<Invoice>, RepositoryError>;
}

#[async_trait]
pub trait FilingRepository<F: Filing>: Send + Sync {
    async fn exists_for_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<bool, RepositoryError>;

    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Option<F>, RepositoryError>;

    /// Persist a filing with all its rows, atomically.
    ///
    /// Fails with [`RepositoryError::Conflict`] when a filing of this kind already
    /// exists for the tenant and period.
    async fn save(&self, filing: &F) -> Result<(), RepositoryError>;

    /// Compare-and-set the status. Returns `false` when no filing for the period is
    /// currently in `expected`.
    async fn update_status(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
        expected: FilingStatus,
        next: FilingStatus,
    ) -> Result<bool, RepositoryError>;
}

/// A filing as stored by the Postgres repository: a JSON document plus its rows.
pub trait PersistedFiling: Filing + Serialize + DeserializeOwned {
    /// Section rows written to the row table alongside the header.
    fn section_rows(&self) -> &[SectionRow] {
        &[]
    }
}

impl PersistedFiling for DetailedFiling {
    fn section_rows(&self) -> &[SectionRow] {
        self.rows()
    }
}

impl PersistedFiling for SummaryFiling {}

#[async_trait]
impl<R> InvoiceRepository for Arc<R>
where
    R: InvoiceRepository + ?Sized,
{
    async fn count_in_scope(&self, scope: &SequenceScope) -> Result<u32, RepositoryError> {
        (**self).count_in_scope(scope).await
    }

    async fn insert_finalized(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        (**self).insert_finalized(invoice).await
    }

    async fn get(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        (**self).get(tenant_id, id).await
    }

    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        (**self).find_by_period(tenant_id, period).await
    }

    async fn update_payment_status(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Option<Invoice>, RepositoryError> {
        (**self).update_payment_status(tenant_id, id, status).await
    }
}

#[async_trait]
impl<F, R> FilingRepository<F> for Arc<R>
where
    F: Filing,
    R: FilingRepository<F> + ?Sized,
{
    async fn exists_for_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<bool, RepositoryError> {
        (**self).exists_for_period(tenant_id, period).await
    }

    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Option<F>, RepositoryError> {
        (**self).find_by_period(tenant_id, period).await
    }

    async fn save(&self, filing: &F) -> Result<(), RepositoryError> {
        (**self).save(filing).await
    }

    async fn update_status(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
        expected: FilingStatus,
        next: FilingStatus,
    ) -> Result<bool, RepositoryError> {
        (**self).update_status(tenant_id, period, expected, next).await
    }
}
