use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{CorrelationId, Result, SagaDocument, StoreError, Version, store::SagaStore};

/// PostgreSQL-backed saga store implementation.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self::new(PgPool::connect(url).await?))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_document(row: PgRow) -> Result<SagaDocument> {
        Ok(SagaDocument {
            correlation_id: CorrelationId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?),
            saga_type: row.try_get("saga_type")?,
            version: Version::new(row.try_get("version")?),
            data: row.try_get("data")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn conflict(
        &self,
        correlation_id: CorrelationId,
        expected: Version,
    ) -> Result<StoreError> {
        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM saga_documents WHERE correlation_id = $1")
                .bind(correlation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(StoreError::VersionConflict {
            correlation_id,
            expected,
            actual: Version::new(actual.unwrap_or(0)),
        })
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn load(&self, correlation_id: CorrelationId) -> Result<Option<SagaDocument>> {
        let row = sqlx::query(
            r#"
            SELECT correlation_id, saga_type, version, data, updated_at
            FROM saga_documents
            WHERE correlation_id = $1
            "#,
        )
        .bind(correlation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn save(&self, document: SagaDocument, expected_version: Version) -> Result<Version> {
        let correlation_id = document.correlation_id;
        let new_version = expected_version.next();

        let result = if expected_version == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO saga_documents (correlation_id, saga_type, version, data, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (correlation_id) DO NOTHING
                "#,
            )
            .bind(correlation_id.as_uuid())
            .bind(&document.saga_type)
            .bind(new_version.as_i64())
            .bind(&document.data)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE saga_documents
                SET saga_type = $2, version = $3, data = $4, updated_at = $5
                WHERE correlation_id = $1 AND version = $6
                "#,
            )
            .bind(correlation_id.as_uuid())
            .bind(&document.saga_type)
            .bind(new_version.as_i64())
            .bind(&document.data)
            .bind(Utc::now())
            .bind(expected_version.as_i64())
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            metrics::counter!("saga_store_version_conflicts_total").increment(1);
            tracing::debug!(%correlation_id, %expected_version, "saga document version conflict");
            return Err(self.conflict(correlation_id, expected_version).await?);
        }

        Ok(new_version)
    }
}
