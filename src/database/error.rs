use std::fmt;

/// What went wrong at the Postgres layer, classified so callers can tell
/// retry-worthy infrastructure trouble from hard data errors.
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    PoolExhausted,
    NotFound { entity: String, id: String },
    /// Duplicate key, e.g. a transaction reference inserted twice
    UniqueConstraintViolation { constraint: String },
    ForeignKeyViolation { constraint: String },
    QueryError { message: String },
    TransactionError { message: String },
    ConnectionError { message: String },
    ConfigError { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found<E: Into<String>, I: fmt::Display>(entity: E, id: I) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        })
    }

    /// Connection-level failures may clear on a later attempt; everything
    /// else is deterministic and must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::PoolExhausted | DatabaseErrorKind::ConnectionError { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::UniqueConstraintViolation { .. }
                | DatabaseErrorKind::ForeignKeyViolation { .. }
        )
    }

    pub fn from_sqlx(error: sqlx::Error) -> Self {
        let kind = match error {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseErrorKind::ConnectionError {
                message: "connection pool closed".to_string(),
            },
            sqlx::Error::Configuration(msg) => DatabaseErrorKind::ConfigError {
                message: msg.to_string(),
            },
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                // Postgres class 23: integrity constraint violations
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseErrorKind::UniqueConstraintViolation { constraint },
                    Some("23503") => DatabaseErrorKind::ForeignKeyViolation { constraint },
                    _ => DatabaseErrorKind::QueryError {
                        message: db_err.message().to_string(),
                    },
                }
            }
            sqlx::Error::Io(io_err) => DatabaseErrorKind::ConnectionError {
                message: io_err.to_string(),
            },
            other => DatabaseErrorKind::Unknown {
                message: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DatabaseErrorKind as K;
        match &self.kind {
            K::PoolExhausted => write!(f, "database connection pool exhausted"),
            K::NotFound { entity, id } => write!(f, "{} '{}' not found", entity, id),
            K::UniqueConstraintViolation { constraint } => {
                write!(f, "duplicate row for unique constraint '{}'", constraint)
            }
            K::ForeignKeyViolation { constraint } => {
                write!(f, "foreign key constraint '{}' violated", constraint)
            }
            K::QueryError { message } => write!(f, "query failed: {}", message),
            K::TransactionError { message } => write!(f, "transaction failed: {}", message),
            K::ConnectionError { message } => write!(f, "database connection error: {}", message),
            K::ConfigError { message } => write!(f, "database misconfigured: {}", message),
            K::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl PartialEq for DatabaseError {
    fn eq(&self, other: &Self) -> bool {
        // For testing purposes
        format!("{:?}", self.kind) == format!("{:?}", other.kind)
    }
}
