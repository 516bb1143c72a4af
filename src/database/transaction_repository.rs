use crate::billing::model::{Invoice, Transaction, TransactionStatus};
use crate::database::error::DatabaseError;
use crate::database::repository::{Repository, TransactionalRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) const COLUMNS: &str = "id, invoice_id, reference, amount_minor, currency, status, \
     platform_fee_minor, gateway_fee_minor, net_minor, channel, gateway_response, \
     gateway_payload, metadata, initiated_at, completed_at, updated_at";

/// Repository for gateway transactions. Rows are inserted here before the
/// gateway is called; every later status change goes through the effect
/// dispatcher's own SQL, not through this repository.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the pending transaction for an invoice payment attempt.
    /// The UNIQUE constraint on `reference` rejects double submission.
    pub async fn create_pending(
        &self,
        invoice: &Invoice,
        reference: &str,
        metadata: Value,
    ) -> Result<Transaction, DatabaseError> {
        let transaction = Transaction::new_pending(invoice, reference, metadata);
        self.insert(&transaction).await
    }

    /// Find a transaction by its gateway reference
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM transactions WHERE reference = $1");
        sqlx::query_as::<_, Transaction>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Close a pending transaction whose initialization the gateway rejected
    /// outright. Guarded on status so settled rows can never be touched.
    pub async fn mark_abandoned(&self, reference: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE transactions
             SET status = $1, completed_at = NOW(), updated_at = NOW()
             WHERE reference = $2 AND status = $3",
        )
        .bind(TransactionStatus::Abandoned)
        .bind(reference)
        .bind(TransactionStatus::Pending)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(result.rows_affected() > 0)
    }

    /// References of pending transactions older than `cutoff`, oldest first.
    /// The sweeper reconciles these against the gateway before aging them out.
    pub async fn stale_pending_references(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, DatabaseError> {
        sqlx::query_scalar::<_, String>(
            "SELECT reference FROM transactions
             WHERE status = $1 AND initiated_at < $2
             ORDER BY initiated_at
             LIMIT $3",
        )
        .bind(TransactionStatus::Pending)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Close pending transactions older than `cutoff`. Returns how many rows
    /// were aged out.
    pub async fn abandon_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE transactions
             SET status = $1, completed_at = NOW(), updated_at = NOW()
             WHERE status = $2 AND initiated_at < $3",
        )
        .bind(TransactionStatus::Abandoned)
        .bind(TransactionStatus::Pending)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Repository for TransactionRepository {
    type Entity = Transaction;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM transactions WHERE id = $1");
        sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    async fn insert(&self, entity: &Self::Entity) -> Result<Self::Entity, DatabaseError> {
        let sql = format!(
            "INSERT INTO transactions
             (id, invoice_id, reference, amount_minor, currency, status,
              platform_fee_minor, gateway_fee_minor, net_minor, channel, gateway_response,
              gateway_payload, metadata, initiated_at, completed_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Transaction>(&sql)
            .bind(entity.id)
            .bind(entity.invoice_id)
            .bind(&entity.reference)
            .bind(entity.amount_minor)
            .bind(&entity.currency)
            .bind(entity.status)
            .bind(entity.platform_fee_minor)
            .bind(entity.gateway_fee_minor)
            .bind(entity.net_minor)
            .bind(&entity.channel)
            .bind(&entity.gateway_response)
            .bind(&entity.gateway_payload)
            .bind(&entity.metadata)
            .bind(entity.initiated_at)
            .bind(entity.completed_at)
            .bind(entity.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Settled transactions are part of the financial record and are never
    /// deleted; the guard makes such a delete report zero rows.
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1 AND status <> $2")
            .bind(id)
            .bind(TransactionStatus::Success)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(result.rows_affected() > 0)
    }
}

impl TransactionalRepository for TransactionRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
