//! SQLite catalogue store for the automation fabric
//!
//! Implements the fabric's [`CatalogueStore`] with UPSERT writes keyed
//! by `(source, slug)`, which is what makes re-running a discovery
//! batch idempotent.

use async_trait::async_trait;

use flowhub_tasks::{CatalogueRecord, CatalogueStore, Result as TaskResult, TaskError};

use crate::db::connection::DatabasePool;
use crate::db::models::CatalogueRow;

/// Catalogue persistence over SQLite
pub struct SqliteCatalogueStore {
    pool: DatabasePool,
}

impl SqliteCatalogueStore {
    /// Create a store over the shared pool
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn broker_err(e: sqlx::Error) -> TaskError {
    TaskError::Broker(e.to_string())
}

#[async_trait]
impl CatalogueStore for SqliteCatalogueStore {
    async fn exists(&self, source: &str, slug: &str) -> TaskResult<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM catalogue_records WHERE source = ? AND slug = ?",
        )
        .bind(source)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(broker_err)?;
        Ok(row.0 > 0)
    }

    async fn upsert(&self, record: CatalogueRecord) -> TaskResult<()> {
        let row = CatalogueRow::from_record(&record);
        sqlx::query(
            "INSERT INTO catalogue_records (source, slug, name_en, name_zh, description_en,
                                            description_zh, pricing, ready, index_retry_pending,
                                            updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (source, slug) DO UPDATE SET
                 name_en = excluded.name_en,
                 name_zh = excluded.name_zh,
                 description_en = excluded.description_en,
                 description_zh = excluded.description_zh,
                 pricing = excluded.pricing,
                 ready = excluded.ready,
                 index_retry_pending = excluded.index_retry_pending,
                 updated_at = excluded.updated_at",
        )
        .bind(&row.source)
        .bind(&row.slug)
        .bind(&row.name_en)
        .bind(&row.name_zh)
        .bind(&row.description_en)
        .bind(&row.description_zh)
        .bind(&row.pricing)
        .bind(row.ready)
        .bind(row.index_retry_pending)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(broker_err)?;
        Ok(())
    }

    async fn list_ready(&self) -> TaskResult<Vec<CatalogueRecord>> {
        let rows = sqlx::query_as::<_, CatalogueRow>(
            "SELECT * FROM catalogue_records WHERE ready = 1 ORDER BY source, slug",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(broker_err)?;
        Ok(rows.into_iter().map(CatalogueRow::into_record).collect())
    }

    async fn mark_index_retry(
        &self,
        keys: &[(String, String)],
        pending: bool,
    ) -> TaskResult<()> {
        for (source, slug) in keys {
            sqlx::query(
                "UPDATE catalogue_records SET index_retry_pending = ?
                 WHERE source = ? AND slug = ?",
            )
            .bind(pending as i64)
            .bind(source)
            .bind(slug)
            .execute(&self.pool)
            .await
            .map_err(broker_err)?;
        }
        Ok(())
    }

    async fn count(&self) -> TaskResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM catalogue_records")
            .fetch_one(&self.pool)
            .await
            .map_err(broker_err)?;
        Ok(row.0 as usize)
    }
}
