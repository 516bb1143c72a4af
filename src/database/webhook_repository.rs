use crate::database::error::DatabaseError;
use crate::database::repository::{Repository, TransactionalRepository};
use crate::webhooks::audit::WebhookAuditLog;
use crate::webhooks::event::WebhookDelivery;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const COLUMNS: &str =
    "id, delivery_id, event_type, reference, payload, outcome, error, received_at, processed_at";

/// One audited webhook delivery. `payload` holds the sanitized event data;
/// `outcome` is filled in once the pipeline resolves the delivery.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub delivery_id: String,
    pub event_type: String,
    pub reference: Option<String>,
    pub payload: Value,
    pub outcome: Option<String>,
    pub error: Option<String>,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Webhook Repository for the delivery audit trail
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an accepted delivery before processing starts
    pub async fn record_received(
        &self,
        delivery_id: &str,
        event_type: &str,
        reference: Option<&str>,
        payload: Value,
    ) -> Result<WebhookEventRecord, DatabaseError> {
        let sql = format!(
            "INSERT INTO webhook_events (id, delivery_id, event_type, reference, payload, received_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookEventRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(delivery_id)
            .bind(event_type)
            .bind(reference)
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Close the audit row with the pipeline's outcome
    pub async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &str,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE webhook_events
             SET outcome = $2, error = $3, processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(outcome)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(())
    }

    /// All audit rows for one gateway delivery id, newest first
    pub async fn find_by_delivery_id(
        &self,
        delivery_id: &str,
    ) -> Result<Vec<WebhookEventRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM webhook_events
             WHERE delivery_id = $1 ORDER BY received_at DESC"
        );
        sqlx::query_as::<_, WebhookEventRecord>(&sql)
            .bind(delivery_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    /// Deliveries that errored, newest first
    pub async fn recent_failures(
        &self,
        limit: i64,
    ) -> Result<Vec<WebhookEventRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM webhook_events
             WHERE error IS NOT NULL
             ORDER BY received_at DESC LIMIT $1"
        );
        sqlx::query_as::<_, WebhookEventRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }
}

#[async_trait]
impl WebhookAuditLog for WebhookRepository {
    async fn delivery_received(&self, delivery: &WebhookDelivery) -> Result<Uuid, DatabaseError> {
        let payload = delivery
            .event
            .payload()
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let record = self
            .record_received(
                &delivery.delivery_id,
                delivery.event.name(),
                delivery.event.reference(),
                payload,
            )
            .await?;
        Ok(record.id)
    }

    async fn delivery_resolved(
        &self,
        audit_id: Uuid,
        outcome: &str,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.record_outcome(audit_id, outcome, error).await
    }
}

#[async_trait]
impl Repository for WebhookRepository {
    type Entity = WebhookEventRecord;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        let sql = format!("SELECT {COLUMNS} FROM webhook_events WHERE id = $1");
        sqlx::query_as::<_, WebhookEventRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    async fn insert(&self, entity: &Self::Entity) -> Result<Self::Entity, DatabaseError> {
        let sql = format!(
            "INSERT INTO webhook_events
             (id, delivery_id, event_type, reference, payload, outcome, error, received_at, processed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookEventRecord>(&sql)
            .bind(entity.id)
            .bind(&entity.delivery_id)
            .bind(&entity.event_type)
            .bind(&entity.reference)
            .bind(&entity.payload)
            .bind(&entity.outcome)
            .bind(&entity.error)
            .bind(entity.received_at)
            .bind(entity.processed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e))?;

        Ok(result.rows_affected() > 0)
    }
}

impl TransactionalRepository for WebhookRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
