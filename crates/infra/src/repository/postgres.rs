//! Postgres-backed repositories.
//!
//! Invoices and filings are stored as JSONB documents next to the columns that carry
//! their uniqueness constraints and lookups. Every query includes `tenant_id` in its
//! `WHERE` clause.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Storage` |
//! | Decode / ColumnDecode | N/A | `Decode` |
//! | PoolClosed, IO, other | N/A | `Storage` |

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use gstkit_core::{Entity, ReturnPeriod, TenantId};
use gstkit_invoicing::{Invoice, InvoiceId, PaymentStatus, SequenceScope};
use gstkit_returns::{FilingStatus, SectionRow};

use super::{FilingRepository, InvoiceRepository, PersistedFiling};
use crate::error::{RepositoryError, map_sqlx_error};

const SCHEMA: &str = include_str!("../../migrations/0001_gst_engine.sql");

/// Create the engine's tables if they do not exist yet.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}

fn encode<T: serde::Serialize>(what: &str, value: &T) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(value)
        .map_err(|e| RepositoryError::Storage(format!("failed to encode {what}: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(
    what: &str,
    value: serde_json::Value,
) -> Result<T, RepositoryError> {
    serde_json::from_value(value)
        .map_err(|e| RepositoryError::Decode(format!("failed to decode {what}: {e}")))
}

fn payload_of(row: &sqlx::postgres::PgRow, what: &str) -> Result<serde_json::Value, RepositoryError> {
    row.try_get("payload")
        .map_err(|e| RepositoryError::Decode(format!("failed to read {what} payload: {e}")))
}

/// Postgres invoice store. Sequence uniqueness is enforced by
/// `invoices_sequence_unique`.
#[derive(Debug, Clone)]
pub struct PostgresInvoiceRepository {
    pool: Arc<PgPool>,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    #[instrument(
        skip(self, scope),
        fields(
            tenant_id = %scope.tenant_id,
            invoice_type = scope.invoice_type.as_str(),
            year = scope.year
        ),
        err
    )]
    async fn count_in_scope(&self, scope: &SequenceScope) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM invoices
            WHERE tenant_id = $1 AND invoice_type = $2 AND invoice_year = $3
            "#,
        )
        .bind(scope.tenant_id.as_uuid())
        .bind(scope.invoice_type.as_str())
        .bind(scope.year)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_in_scope", e))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| RepositoryError::Decode(format!("failed to read count: {e}")))?;
        u32::try_from(total)
            .map_err(|_| RepositoryError::Decode(format!("invoice count out of range: {total}")))
    }

    #[instrument(
        skip(self, invoice),
        fields(
            tenant_id = %invoice.tenant_id(),
            invoice_number = %invoice.number()
        ),
        err
    )]
    async fn insert_finalized(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        let number = invoice.number();
        let sequence = i32::try_from(number.sequence())
            .map_err(|_| RepositoryError::Storage(format!("sequence out of range: {number}")))?;
        let payload = encode("invoice", invoice)?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                tenant_id,
                invoice_id,
                invoice_type,
                invoice_year,
                sequence_number,
                invoice_number,
                invoice_date,
                place_of_supply,
                taxable_total,
                grand_total,
                payload,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(invoice.tenant_id().as_uuid())
        .bind(invoice.id_typed().0.as_uuid())
        .bind(invoice.invoice_type().as_str())
        .bind(number.year())
        .bind(sequence)
        .bind(number.to_string())
        .bind(invoice.invoice_date())
        .bind(invoice.place_of_supply().as_str())
        .bind(invoice.taxable_total())
        .bind(invoice.grand_total())
        .bind(&payload)
        .bind(invoice.created_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %id.0), err)]
    async fn get(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let row = sqlx::query("SELECT payload FROM invoices WHERE tenant_id = $1 AND invoice_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.0.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_invoice", e))?;

        row.map(|row| decode("invoice", payload_of(&row, "invoice")?))
            .transpose()
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, period = %period, invoice_count = tracing::field::Empty),
        err
    )]
    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT payload
            FROM invoices
            WHERE tenant_id = $1 AND invoice_date BETWEEN $2 AND $3
            ORDER BY invoice_date ASC, invoice_type ASC, sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(period.first_day())
        .bind(period.last_day())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_invoices_by_period", e))?;

        let mut invoices = rows
            .iter()
            .map(|row| decode::<Invoice>("invoice", payload_of(row, "invoice")?))
            .collect::<Result<Vec<_>, _>>()?;
        // Canonical (date, number) order, independent of column collation.
        invoices.sort_by_key(|inv| (inv.invoice_date(), inv.number()));

        Span::current().record("invoice_count", invoices.len());
        Ok(invoices)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %id.0), err)]
    async fn update_payment_status(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Option<Invoice>, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            "SELECT payload FROM invoices WHERE tenant_id = $1 AND invoice_id = $2 FOR UPDATE",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.0.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_invoice", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };

        let updated = decode::<Invoice>("invoice", payload_of(&row, "invoice")?)?
            .with_payment_status(status);
        sqlx::query("UPDATE invoices SET payload = $3 WHERE tenant_id = $1 AND invoice_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.0.as_uuid())
            .bind(encode("invoice", &updated)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_payment_status", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(updated))
    }
}

/// Postgres filing store for one filing kind.
///
/// `save` writes the header and every section row in one transaction; a unique
/// violation on `(tenant_id, kind, period)` rolls the whole filing back.
#[derive(Debug)]
pub struct PostgresFilingRepository<F> {
    pool: Arc<PgPool>,
    _kind: PhantomData<fn() -> F>,
}

impl<F> Clone for PostgresFilingRepository<F> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            _kind: PhantomData,
        }
    }
}

impl<F> PostgresFilingRepository<F> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            _kind: PhantomData,
        }
    }
}

async fn insert_rows(
    tx: &mut Transaction<'_, Postgres>,
    filing_id: uuid::Uuid,
    rows: &[SectionRow],
) -> Result<(), RepositoryError> {
    for (idx, row) in rows.iter().enumerate() {
        let row_no = i32::try_from(idx + 1)
            .map_err(|_| RepositoryError::Storage("too many filing rows".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO filing_rows (
                filing_id,
                row_no,
                section,
                section_key,
                taxable_value,
                igst,
                cgst,
                sgst,
                invoices
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(filing_id)
        .bind(row_no)
        .bind(row.section.as_str())
        .bind(encode("section key", &row.key)?)
        .bind(row.amounts.taxable_value)
        .bind(row.amounts.igst)
        .bind(row.amounts.cgst)
        .bind(row.amounts.sgst)
        .bind(encode("row invoices", &row.invoices)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_filing_row", e))?;
    }
    Ok(())
}

#[async_trait]
impl<F: PersistedFiling> FilingRepository<F> for PostgresFilingRepository<F> {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period, kind = F::KIND.as_str()), err)]
    async fn exists_for_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM filings WHERE tenant_id = $1 AND kind = $2 AND period = $3) AS present",
        )
        .bind(tenant_id.as_uuid())
        .bind(F::KIND.as_str())
        .bind(period.to_string())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("filing_exists", e))?;

        row.try_get("present")
            .map_err(|e| RepositoryError::Decode(format!("failed to read existence flag: {e}")))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period, kind = F::KIND.as_str()), err)]
    async fn find_by_period(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
    ) -> Result<Option<F>, RepositoryError> {
        let row = sqlx::query(
            "SELECT payload FROM filings WHERE tenant_id = $1 AND kind = $2 AND period = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(F::KIND.as_str())
        .bind(period.to_string())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_filing", e))?;

        let filing = row
            .map(|row| decode::<F>("filing", payload_of(&row, "filing")?))
            .transpose()?;
        if let Some(found) = &filing {
            if found.tenant_id() != tenant_id {
                return Err(RepositoryError::TenantIsolation(format!(
                    "filing {} stored under tenant {tenant_id} belongs to {}",
                    found.id(),
                    found.tenant_id()
                )));
            }
        }
        Ok(filing)
    }

    #[instrument(
        skip(self, filing),
        fields(
            tenant_id = %filing.tenant_id(),
            period = %filing.period(),
            kind = F::KIND.as_str(),
            row_count = filing.section_rows().len()
        ),
        err
    )]
    async fn save(&self, filing: &F) -> Result<(), RepositoryError> {
        let payload = encode("filing", filing)?;
        let filing_id = *filing.id().0.as_uuid();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO filings (
                filing_id,
                tenant_id,
                kind,
                period,
                status,
                generated_at,
                payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(filing_id)
        .bind(filing.tenant_id().as_uuid())
        .bind(F::KIND.as_str())
        .bind(filing.period().to_string())
        .bind(filing.status().as_str())
        .bind(filing.generated_at())
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_filing", e))?;

        // Dropping `tx` on an error path rolls back the header as well.
        insert_rows(&mut tx, filing_id, filing.section_rows()).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(
            tenant_id = %tenant_id,
            period = %period,
            kind = F::KIND.as_str(),
            from = expected.as_str(),
            to = next.as_str()
        ),
        err
    )]
    async fn update_status(
        &self,
        tenant_id: TenantId,
        period: ReturnPeriod,
        expected: FilingStatus,
        next: FilingStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE filings
            SET status = $5,
                payload = jsonb_set(payload, '{status}', to_jsonb($5::text))
            WHERE tenant_id = $1 AND kind = $2 AND period = $3 AND status = $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(F::KIND.as_str())
        .bind(period.to_string())
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_filing_status", e))?;

        Ok(result.rows_affected() == 1)
    }
}
