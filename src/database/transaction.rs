use crate::database::error::{DatabaseError, DatabaseErrorKind};
use sqlx::Transaction as SqlxTransaction;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::debug;

/// Owned wrapper around a sqlx transaction. `commit`/`rollback` consume it;
/// dropping it un-completed rolls back via sqlx's own drop guard.
pub struct DatabaseTransaction {
    inner: Option<SqlxTransaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    pub async fn begin(pool: &PgPool) -> Result<Self, DatabaseError> {
        let inner = pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        debug!("transaction open");
        Ok(Self { inner: Some(inner) })
    }

    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        let tx = self.inner.take().ok_or_else(Self::already_completed)?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        let tx = self.inner.take().ok_or_else(Self::already_completed)?;
        tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Connection for executing queries inside the transaction. Also handed
    /// to callbacks so their writes join the same atomic unit.
    pub fn conn(&mut self) -> &mut PgConnection {
        let tx = self
            .inner
            .as_mut()
            .expect("transaction was already completed");
        &mut **tx
    }

    fn already_completed() -> DatabaseError {
        DatabaseError::new(DatabaseErrorKind::TransactionError {
            message: "transaction already completed".to_string(),
        })
    }
}
