//! In-memory repositories for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use gstkit_core::{ReturnPeriod, TenantId};
use gstkit_invoicing::{Invoice, InvoiceId, InvoiceNumber, PaymentStatus, SequenceScope};
use gstkit_returns::{Filing, FilingStatus};

use super::{FilingRepository, InvoiceRepository};
use crate::error::RepositoryError;

fn poisoned(_: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Storage("in-memory store lock poisoned".to_string())
}

#[derive(Debug, Default)]
struct InvoiceTables {
    by_id: HashMap<(TenantId, InvoiceId), Invoice>,
    /// Uniqueness backstop for (tenant, type, year, sequence).
    numbers: HashMap<(TenantId, InvoiceNumber), InvoiceId>,
}

/// In-memory invoice store with the same uniqueness guarantees as Postgres.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    inner: RwLock<InvoiceTables>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn count_in_scope(&self, scope: &SequenceScope) -> Result<u32, RepositoryError> {
        let tables = self.inner.read().map_err(poisoned)?;
        let count = tables
            .by_id
            .values()
            .filter(|inv| inv.sequence_scope() == *scope)
            .count();
        u32::try_from(count).map_err(|_| RepositoryError::Storage("sequence count overflow".to_string()))
    }

    async fn insert_finalized(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        let mut tables = self.inner.write().map_err(poisoned)?;
        let tenant_id = invoice.tenant_id();
        let number_key = (tenant_id, invoice.number());
        if tables.numbers.contains_key(&number_key) {
            return Err(RepositoryError::Conflict(format!(
                "invoice number {} already assigned",
                invoice.number()
            )));
        }
        let id_key = (tenant_id, invoice.id_typed());
        if tables.by_id.contains_key(&id_key) {
            return Err(RepositoryError::Conflict(format!(
                "invoice {} already stored",
                invoice.id_typed()
            )));
        }
        tables.numbers.insert(number_key, invoice.id_typed());
        tables.by_id.insert(id_key, invoice.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let tables = self.inner.read().map_err(poisoned)?;
        Ok(tables.by_id.get(&(tenant_id, id)).cloned())
    }

    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        let tables = self.inner.read().map_err(poisoned)?;
        let mut invoices: Vec<Invoice> = tables
            .by_id
            .iter()
            .filter(|((t, _), inv)| *t == tenant_id && period.contains(inv.invoice_date()))
            .map(|(_, inv)| inv.clone())
            .collect();
        invoices.sort_by_key(|inv| (inv.invoice_date(), inv.number()));
        Ok(invoices)
    }

    async fn update_payment_status(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Option<Invoice>, RepositoryError> {
        let mut tables = self.inner.write().map_err(poisoned)?;
        let Some(stored) = tables.by_id.remove(&(tenant_id, id)) else {
            return Ok(None);
        };
        let updated = stored.with_payment_status(status);
        tables.by_id.insert((tenant_id, id), updated.clone());
        Ok(Some(updated))
    }
}

/// In-memory filing store, one filing of kind `F` per (tenant, period).
#[derive(Debug)]
pub struct InMemoryFilingRepository<F> {
    inner: RwLock<HashMap<(TenantId, ReturnPeriod), F>>,
}

impl<F> InMemoryFilingRepository<F> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<F> Default for InMemoryFilingRepository<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<F: Filing> FilingRepository<F> for InMemoryFilingRepository<F> {
    async fn exists_for_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<bool, RepositoryError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.contains_key(&(tenant_id, period)))
    }

    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Option<F>, RepositoryError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(&(tenant_id, period)).cloned())
    }

    async fn save(&self, filing: &F) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let key = (filing.tenant_id(), filing.period());
        if map.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "{} filing for period {} already exists",
                F::KIND.as_str(),
                filing.period()
            )));
        }
        map.insert(key, filing.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
        expected: FilingStatus,
        next: FilingStatus,
    ) -> Result<bool, RepositoryError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let key = (tenant_id, period);
        match map.remove(&key) {
            Some(filing) if filing.status() == expected => {
                map.insert(key, filing.with_status(next));
                Ok(true)
            }
            Some(filing) => {
                map.insert(key, filing);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
