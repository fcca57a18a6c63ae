//! Database error classification

use thiserror::Error;

/// Wrapper over sqlx errors with HTTP-relevant classification
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying sqlx failure
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Optimistic concurrency loss: the expected version was stale
    #[error("Version conflict on {entity} {id}")]
    VersionConflict {
        /// Entity type, e.g. "workflow"
        entity: &'static str,
        /// Entity id
        id: String,
    },

    /// Row (de)serialization failure in a JSON column
    #[error("Corrupt JSON column: {0}")]
    CorruptColumn(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Whether the error means "row not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Whether the error is a constraint violation (duplicate key)
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Whether the error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::VersionConflict { .. })
    }

    /// Whether the database itself is unreachable (pool or I/O level)
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlx(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }
}
