//! Filing headers and the filing status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gstkit_core::{AggregateId, DomainError, DomainResult, Entity, ReturnPeriod, TenantId};

use crate::section::{SectionAmounts, SectionKind, SectionRow};

/// Filing identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilingId(pub AggregateId);

impl FilingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FilingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilingKind {
    Detailed,
    Summary,
}

impl FilingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilingKind::Detailed => "detailed",
            FilingKind::Summary => "summary",
        }
    }
}

/// Filing lifecycle. Generation only ever creates `Draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilingStatus {
    Draft,
    Filed,
    Amended,
}

impl FilingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FilingStatus::Draft => "draft",
            FilingStatus::Filed => "filed",
            FilingStatus::Amended => "amended",
        }
    }

    /// `draft -> filed -> amended`; every other move is rejected.
    pub fn transition(self, to: FilingStatus) -> DomainResult<FilingStatus> {
        match (self, to) {
            (FilingStatus::Draft, FilingStatus::Filed)
            | (FilingStatus::Filed, FilingStatus::Amended) => Ok(to),
            (from, to) => Err(DomainError::invariant(format!(
                "filing cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            ))),
        }
    }
}

impl core::str::FromStr for FilingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(FilingStatus::Draft),
            "filed" => Ok(FilingStatus::Filed),
            "amended" => Ok(FilingStatus::Amended),
            other => Err(DomainError::validation(format!("unknown filing status '{other}'"))),
        }
    }
}

/// Common view of both filing kinds, used by repositories.
pub trait Filing: Entity<Id = FilingId> + Clone + Send + Sync + 'static {
    const KIND: FilingKind;

    fn tenant_id(&self) -> TenantId;
    fn period(&self) -> ReturnPeriod;
    fn status(&self) -> FilingStatus;
    fn generated_at(&self) -> DateTime<Utc>;

    /// Return a copy with `status`, without validating the move.
    fn with_status(self, status: FilingStatus) -> Self;

    /// Move to `to`, enforcing the lifecycle.
    fn transition(self, to: FilingStatus) -> DomainResult<Self> {
        let next = self.status().transition(to)?;
        Ok(self.with_status(next))
    }
}

/// Detailed (sales) return for one tenant and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedFiling {
    pub(crate) id: FilingId,
    pub(crate) tenant_id: TenantId,
    pub(crate) period: ReturnPeriod,
    pub(crate) status: FilingStatus,
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) invoice_count: usize,
    pub(crate) rows: Vec<SectionRow>,
}

impl DetailedFiling {
    pub fn id_typed(&self) -> FilingId {
        self.id
    }

    /// Number of distinct invoices classified.
    pub fn invoice_count(&self) -> usize {
        self.invoice_count
    }

    pub fn rows(&self) -> &[SectionRow] {
        &self.rows
    }

    pub fn rows_in(&self, section: SectionKind) -> impl Iterator<Item = &SectionRow> {
        self.rows.iter().filter(move |r| r.section == section)
    }

    pub fn section_totals(&self, section: SectionKind) -> DomainResult<SectionAmounts> {
        SectionAmounts::try_sum(self.rows_in(section).map(|r| r.amounts))
    }
}

impl Entity for DetailedFiling {
    type Id = FilingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Filing for DetailedFiling {
    const KIND: FilingKind = FilingKind::Detailed;

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn period(&self) -> ReturnPeriod {
        self.period
    }

    fn status(&self) -> FilingStatus {
        self.status
    }

    fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    fn with_status(mut self, status: FilingStatus) -> Self {
        self.status = status;
        self
    }
}
