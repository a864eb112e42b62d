//! Postgres-backed registry store.
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) so the crate
//! builds without a database. Uniqueness is enforced by the
//! `(scope_key, sku)` unique constraint and `ON CONFLICT DO NOTHING`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{SkuRecord, SkuStore};
use crate::sku::CategoryMap;

#[derive(Debug, FromRow)]
struct SkuRecordRow {
    record_id: Uuid,
    scope_key: String,
    product_name: String,
    categories: Json<CategoryMap>,
    sku: String,
    created_at: DateTime<Utc>,
}

impl From<SkuRecordRow> for SkuRecord {
    fn from(row: SkuRecordRow) -> Self {
        Self {
            record_id: row.record_id,
            scope_key: row.scope_key,
            product_name: row.product_name,
            categories: row.categories.0,
            sku: row.sku,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgSkuStore {
    pool: PgPool,
}

impl PgSkuStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `sku_records` table and its indexes if missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sku_records (
                record_id    UUID PRIMARY KEY,
                scope_key    TEXT NOT NULL,
                product_name TEXT NOT NULL,
                categories   JSONB NOT NULL DEFAULT '{}'::jsonb,
                sku          TEXT NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT sku_records_scope_sku_key UNIQUE (scope_key, sku)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create sku_records table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS sku_records_sku_idx ON sku_records (sku)")
            .execute(&self.pool)
            .await
            .context("Failed to create sku_records sku index")?;

        info!("sku_records schema ready");
        Ok(())
    }
}

#[async_trait]
impl SkuStore for PgSkuStore {
    async fn try_reserve(&self, record: &SkuRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sku_records (record_id, scope_key, product_name, categories, sku, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (scope_key, sku) DO NOTHING
            "#,
        )
        .bind(record.record_id)
        .bind(&record.scope_key)
        .bind(&record.product_name)
        .bind(Json(&record.categories))
        .bind(&record.sku)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert SKU record")?;
        Ok(result.rows_affected() == 1)
    }

    async fn contains(&self, scope_key: &str, sku: &str) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sku_records WHERE scope_key = $1 AND sku = $2)",
        )
        .bind(scope_key)
        .bind(sku)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check SKU existence")?;
        Ok(exists)
    }

    async fn find(&self, sku: &str) -> anyhow::Result<Option<SkuRecord>> {
        let row = sqlx::query_as::<_, SkuRecordRow>(
            r#"
            SELECT record_id, scope_key, product_name, categories, sku, created_at
            FROM sku_records
            WHERE sku = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up SKU")?;
        Ok(row.map(SkuRecord::from))
    }

    async fn release(&self, record: &SkuRecord) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sku_records WHERE record_id = $1")
            .bind(record.record_id)
            .execute(&self.pool)
            .await
            .context("Failed to release SKU record")?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear(&self) -> anyhow::Result<Vec<SkuRecord>> {
        let rows = sqlx::query_as::<_, SkuRecordRow>(
            r#"
            DELETE FROM sku_records
            RETURNING record_id, scope_key, product_name, categories, sku, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to clear sku_records")?;
        Ok(rows.into_iter().map(SkuRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sku::Product;
    use sqlx::postgres::PgPoolOptions;

    async fn store() -> PgSkuStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("failed to connect to test database");
        let store = PgSkuStore::new(pool);
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn insert_if_absent_round_trip() {
        let store = store().await;
        let scope = format!("test-{}", Uuid::new_v4());
        let product = Product::canonicalize("Pg Widget", &CategoryMap::new()).unwrap();
        let record = SkuRecord::new(&scope, &product, "PG-WID");

        assert!(store.try_reserve(&record).await.unwrap());
        assert!(!store
            .try_reserve(&SkuRecord::new(&scope, &product, "PG-WID"))
            .await
            .unwrap());
        assert!(store.contains(&scope, "PG-WID").await.unwrap());

        let found = store.find("PG-WID").await.unwrap().unwrap();
        assert_eq!(found.product_name, "Pg Widget");

        assert!(store.release(&record).await.unwrap());
        assert!(!store.contains(&scope, "PG-WID").await.unwrap());
    }
}
