use crate::billing::model::{Invoice, InvoiceStatus};
use crate::database::error::DatabaseError;
use crate::database::repository::{Repository, TransactionalRepository};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) const COLUMNS: &str = "id, invoice_number, invoice_type, owner_id, currency, total_minor, \
     platform_fee_minor, status, due_date, paid_date, gateway_reference, created_at, updated_at";

/// Repository for invoices. Settlement status changes happen inside the
/// effect dispatcher; this repository covers issuance, lookup and the
/// time-based overdue sweep.
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an invoice by its human-facing number
    pub async fn find_by_number(&self, number: &str) -> Result<Option<Invoice>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM invoices WHERE invoice_number = $1");
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Age sent invoices whose due date has passed into overdue.
    /// Returns how many rows transitioned.
    pub async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE invoices
             SET status = $1, updated_at = NOW()
             WHERE status = $2 AND due_date < $3",
        )
        .bind(InvoiceStatus::Overdue)
        .bind(InvoiceStatus::Sent)
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Repository for InvoiceRepository {
    type Entity = Invoice;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM invoices WHERE id = $1");
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    async fn insert(&self, entity: &Self::Entity) -> Result<Self::Entity, DatabaseError> {
        let sql = format!(
            "INSERT INTO invoices
             (id, invoice_number, invoice_type, owner_id, currency, total_minor,
              platform_fee_minor, status, due_date, paid_date, gateway_reference,
              created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(entity.id)
            .bind(&entity.invoice_number)
            .bind(entity.invoice_type)
            .bind(entity.owner_id)
            .bind(&entity.currency)
            .bind(entity.total_minor)
            .bind(entity.platform_fee_minor)
            .bind(entity.status)
            .bind(entity.due_date)
            .bind(entity.paid_date)
            .bind(&entity.gateway_reference)
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Paid invoices stay on the books; deleting one reports zero rows
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1 AND status <> $2")
            .bind(id)
            .bind(InvoiceStatus::Paid)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(result.rows_affected() > 0)
    }
}

impl TransactionalRepository for InvoiceRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
