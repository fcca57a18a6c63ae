//! Catalogue record row model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use flowhub_tasks::CatalogueRecord;

/// A catalogue entry as stored in SQLite
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CatalogueRow {
    /// Dedup source
    pub source: String,
    /// Dedup slug
    pub slug: String,
    pub name_en: String,
    pub name_zh: String,
    pub description_en: String,
    pub description_zh: String,
    /// free | freemium | paid | unknown
    pub pricing: String,
    /// SQLite boolean
    pub ready: i64,
    /// SQLite boolean
    pub index_retry_pending: i64,
    /// RFC3339
    pub updated_at: String,
}

impl CatalogueRow {
    /// Convert from the fabric's record type
    pub fn from_record(record: &CatalogueRecord) -> Self {
        Self {
            source: record.source.clone(),
            slug: record.slug.clone(),
            name_en: record.name_en.clone(),
            name_zh: record.name_zh.clone(),
            description_en: record.description_en.clone(),
            description_zh: record.description_zh.clone(),
            pricing: record.pricing.clone(),
            ready: record.ready as i64,
            index_retry_pending: record.index_retry_pending as i64,
            updated_at: record.updated_at.to_rfc3339(),
        }
    }

    /// Convert into the fabric's record type
    pub fn into_record(self) -> CatalogueRecord {
        CatalogueRecord {
            source: self.source,
            slug: self.slug,
            name_en: self.name_en,
            name_zh: self.name_zh,
            description_en: self.description_en,
            description_zh: self.description_zh,
            pricing: self.pricing,
            ready: self.ready != 0,
            index_retry_pending: self.index_retry_pending != 0,
            updated_at: DateTime::parse_from_rfc3339(&self.updated_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}
