use chrono::Utc;
use tracing::{info, instrument, warn};

use gstkit_core::{AggregateId, StateCode, TenantId};
use gstkit_invoicing::{
    DraftInvoice, Invoice, InvoiceId, InvoiceNumberSequencer, PaymentStatus, TaxBreakdownCalculator,
};

use crate::config::{ConfigError, EngineConfig};
use crate::error::{RepositoryError, ServiceError};
use crate::repository::InvoiceRepository;

/// Finalizes drafts into numbered, taxed invoices.
#[derive(Debug)]
pub struct InvoiceService<R> {
    repo: R,
    calculator: TaxBreakdownCalculator,
    max_attempts: u32,
}

impl<R: InvoiceRepository> InvoiceService<R> {
    pub fn new(repo: R, calculator: TaxBreakdownCalculator, max_attempts: u32) -> Self {
        Self {
            repo,
            calculator,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(repo: R, config: &EngineConfig) -> Result<Self, ConfigError> {
        let calculator = config.jurisdiction()?.calculator();
        Ok(Self::new(repo, calculator, config.finalize_max_attempts))
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Number, tax and persist `draft`.
    ///
    /// The sequence is derived from the persisted count in the draft's scope. When a
    /// concurrent finalization takes the same number first, the count is re-read and
    /// the number recomputed, up to the configured attempt limit.
    #[instrument(
        skip(self, draft),
        fields(
            tenant_id = %draft.tenant_id,
            invoice_type = draft.invoice_type.as_str(),
            seller_state = %seller_state
        ),
        err
    )]
    pub async fn finalize(
        &self,
        draft: DraftInvoice,
        seller_state: StateCode,
    ) -> Result<Invoice, ServiceError> {
        let scope = draft.sequence_scope();

        for attempt in 1..=self.max_attempts {
            let prior = self.repo.count_in_scope(&scope).await?;
            let number = InvoiceNumberSequencer.next(&scope, prior)?;
            let invoice = draft.clone().finalize(
                InvoiceId::new(AggregateId::new()),
                number,
                seller_state,
                &self.calculator,
                Utc::now(),
            )?;

            match self.repo.insert_finalized(&invoice).await {
                Ok(()) => {
                    info!(
                        invoice_number = %invoice.number(),
                        grand_total = %invoice.grand_total(),
                        attempt,
                        "invoice finalized"
                    );
                    return Ok(invoice);
                }
                Err(RepositoryError::Conflict(msg)) => {
                    warn!(invoice_number = %number, attempt, error = %msg, "invoice number taken, recomputing");
                    tokio::task::yield_now().await;
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(attempts = self.max_attempts, "invoice finalization gave up");
        Err(ServiceError::ConcurrencyConflict(format!(
            "could not assign a {} invoice number for {} after {} attempts",
            scope.invoice_type.as_str(),
            scope.year,
            self.max_attempts
        )))
    }

    pub async fn get(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Invoice, ServiceError> {
        self.repo
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {id}")))
    }

    /// Record payment state. Tax fields are never touched.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %id), err)]
    pub async fn set_payment_status(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Invoice, ServiceError> {
        self.repo
            .update_payment_status(tenant_id, id, status)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {id}")))
    }
}
