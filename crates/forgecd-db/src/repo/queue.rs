use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgecd_core::QueueElement;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait QueueRepo: Send + Sync {
    async fn insert(&self, element: &QueueElement) -> DbResult<()>;

    /// FIFO load, ordered by `created_at` ascending (spec §4.4 step 1).
    /// Takes the Binder's transaction so the read is part of the same
    /// transactional scope as the binds that follow.
    async fn list_fifo(&self, tx: &mut Transaction<'_, Postgres>) -> DbResult<Vec<QueueElement>>;

    async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: &str) -> DbResult<()>;
}

pub struct PgQueueRepo {
    pool: PgPool,
}

impl PgQueueRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: String,
    context: serde_json::Value,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl QueueRepo for PgQueueRepo {
    async fn insert(&self, element: &QueueElement) -> DbResult<()> {
        let context = serde_json::to_value(&element.context)
            .map_err(|e| DbError::Conflict(format!("failed to serialize queue context: {e}")))?;
        sqlx::query("INSERT INTO queue (id, context, created_at) VALUES ($1, $2, $3)")
            .bind(&element.id)
            .bind(context)
            .bind(element.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_fifo(&self, tx: &mut Transaction<'_, Postgres>) -> DbResult<Vec<QueueElement>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            "SELECT id, context, created_at FROM queue ORDER BY created_at ASC",
        )
        .fetch_all(&mut **tx)
        .await?;

        let mut elements = Vec::with_capacity(rows.len());
        for row in rows {
            let context = serde_json::from_value(row.context)
                .map_err(|e| DbError::Conflict(format!("malformed queue context: {e}")))?;
            elements.push(QueueElement {
                id: row.id,
                context,
                created_at: row.created_at,
            });
        }
        Ok(elements)
    }

    async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM queue WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
