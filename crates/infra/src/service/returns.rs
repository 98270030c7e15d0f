use chrono::Utc;
use tracing::{info, instrument, warn};

use gstkit_core::{AggregateId, ReturnPeriod, TenantId};
use gstkit_returns::{
    DetailedFiling, Filing, FilingId, FilingKind, FilingStatus, ReturnAggregator, ReturnClassifier,
    SummaryFiling,
};

use crate::config::{ConfigError, EngineConfig};
use crate::error::ServiceError;
use crate::repository::{FilingRepository, InvoiceRepository};

/// Generates detailed and summary filings and moves them through their lifecycle.
#[derive(Debug)]
pub struct ReturnService<I, D, S> {
    invoices: I,
    detailed: D,
    summaries: S,
    classifier: ReturnClassifier,
    aggregator: ReturnAggregator,
}

impl<I, D, S> ReturnService<I, D, S>
where
    I: InvoiceRepository,
    D: FilingRepository<DetailedFiling>,
    S: FilingRepository<SummaryFiling>,
{
    pub fn new(invoices: I, detailed: D, summaries: S, classifier: ReturnClassifier) -> Self {
        Self {
            invoices,
            detailed,
            summaries,
            classifier,
            aggregator: ReturnAggregator,
        }
    }

    pub fn from_config(
        invoices: I,
        detailed: D,
        summaries: S,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        let classifier = ReturnClassifier::for_jurisdiction(&config.jurisdiction()?);
        Ok(Self::new(invoices, detailed, summaries, classifier))
    }

    /// Classify every invoice of the period into a new detailed filing.
    ///
    /// Fails with `DuplicateFiling` when one already exists. A concurrent generator
    /// that wins the insert surfaces as `ConcurrencyConflict`; nothing partial is kept.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    pub async fn generate_detailed_filing(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<DetailedFiling, ServiceError> {
        if self.detailed.exists_for_period(tenant_id, period).await? {
            warn!("detailed filing already generated");
            return Err(ServiceError::DuplicateFiling(format!(
                "detailed filing for period {period} already exists"
            )));
        }

        let invoices = self.invoices.find_by_period(tenant_id, period).await?;
        let filing = self.classifier.classify(
            tenant_id,
            period,
            &invoices,
            FilingId::new(AggregateId::new()),
            Utc::now(),
        )?;

        self.detailed.save(&filing).await?;
        info!(
            filing_id = %filing.id_typed(),
            invoice_count = filing.invoice_count(),
            row_count = filing.rows().len(),
            "detailed filing generated"
        );
        Ok(filing)
    }

    /// Aggregate the period's detailed filing into a new summary filing.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    pub async fn generate_summary_filing(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<SummaryFiling, ServiceError> {
        if self.summaries.exists_for_period(tenant_id, period).await? {
            warn!("summary filing already generated");
            return Err(ServiceError::DuplicateFiling(format!(
                "summary filing for period {period} already exists"
            )));
        }

        let detailed = self.detailed.find_by_period(tenant_id, period).await?;
        let summary = self
            .aggregator
            .generate(
                tenant_id,
                period,
                detailed.as_ref(),
                FilingId::new(AggregateId::new()),
                Utc::now(),
            )
            .inspect_err(|e| warn!(error = %e, "summary filing rejected"))?;

        self.summaries.save(&summary).await?;
        info!(
            filing_id = %summary.id_typed(),
            outward_groups = summary.outward_taxable().len(),
            small_unregistered_groups = summary.small_unregistered().len(),
            "summary filing generated"
        );
        Ok(summary)
    }

    pub async fn detailed_filing(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<DetailedFiling, ServiceError> {
        self.detailed
            .find_by_period(tenant_id, period)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("detailed filing for period {period}")))
    }

    pub async fn summary_filing(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<SummaryFiling, ServiceError> {
        self.summaries
            .find_by_period(tenant_id, period)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("summary filing for period {period}")))
    }

    /// Apply an external filing or correction action to a stored filing.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, period = %period, kind = kind.as_str(), to = to.as_str()),
        err
    )]
    pub async fn transition_status(
        &self,
        kind: FilingKind,
        tenant_id: TenantId,
        period: ReturnPeriod,
        to: FilingStatus,
    ) -> Result<FilingStatus, ServiceError> {
        match kind {
            FilingKind::Detailed => transition::<DetailedFiling, _>(&self.detailed, tenant_id, period, to).await,
            FilingKind::Summary => transition::<SummaryFiling, _>(&self.summaries, tenant_id, period, to).await,
        }
    }
}

async fn transition<F, R>(
    repo: &R,
    tenant_id: TenantId,
    period: ReturnPeriod,
    to: FilingStatus,
) -> Result<FilingStatus, ServiceError>
where
    F: Filing,
    R: FilingRepository<F>,
{
    let current = repo.find_by_period(tenant_id, period).await?.ok_or_else(|| {
        ServiceError::NotFound(format!("{} filing for period {period}", F::KIND.as_str()))
    })?;
    let from = current.status();
    let next = current.transition(to)?.status();

    if !repo.update_status(tenant_id, period, from, next).await? {
        warn!(from = from.as_str(), "filing status changed concurrently");
        return Err(ServiceError::ConcurrencyConflict(format!(
            "{} filing for period {period} is no longer {}",
            F::KIND.as_str(),
            from.as_str()
        )));
    }
    info!(from = from.as_str(), to = next.as_str(), "filing status updated");
    Ok(next)
}
