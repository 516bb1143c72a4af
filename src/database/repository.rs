use crate::database::error::DatabaseError;
use async_trait::async_trait;
use uuid::Uuid;

/// Common shape of the per-entity repositories.
///
/// Deliberately has no generic `update`: settlement writes go through the
/// effect dispatcher inside its own transaction, and nothing else may mutate
/// billing rows.
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: Send + Sync;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError>;

    async fn insert(&self, entity: &Self::Entity) -> Result<Self::Entity, DatabaseError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;

    async fn exists(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

/// Repositories whose queries can also run inside a caller-owned transaction.
#[async_trait]
pub trait TransactionalRepository: Repository {
    fn pool(&self) -> &sqlx::PgPool;
}
