//! Database connection management

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

use crate::db::schema;

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Database connection wrapper shared across services
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: Arc<DatabasePool>,
}

impl DatabaseConnection {
    /// Connect and initialize the schema
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string
    ///   (e.g. "sqlite:flowhub.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_max_connections(database_url, 5).await
    }

    /// Connect with a custom pool size
    pub async fn with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, sqlx::Error> {
        // An in-memory database exists per connection; a pool of one
        // keeps every query on the same database
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        schema::init_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Health check: run a trivial query
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_health_check() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.health_check().await.unwrap();
    }
}
