//! Database error classification

use thiserror::Error;
use tokio_postgres::error::SqlState;

pub type DbResult<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// No connection could be checked out of the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A UNIQUE constraint rejected the write
    #[error("Unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("{context}: {source}")]
    Query {
        context: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DbError {
    /// Constraint name when this is a unique violation
    pub fn unique_constraint(&self) -> Option<&str> {
        match self {
            DbError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

/// Attach a description to driver errors, splitting out unique violations
pub(crate) trait QueryContext<T> {
    fn context(self, context: &'static str) -> DbResult<T>;
}

impl<T> QueryContext<T> for Result<T, tokio_postgres::Error> {
    fn context(self, context: &'static str) -> DbResult<T> {
        self.map_err(|source| {
            if source.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                let constraint = source
                    .as_db_error()
                    .and_then(|db| db.constraint())
                    .unwrap_or("unknown")
                    .to_string();
                DbError::UniqueViolation { constraint }
            } else {
                DbError::Query { context, source }
            }
        })
    }
}
