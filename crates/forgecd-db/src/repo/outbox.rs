use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::DbResult;

/// Outbox pattern (spec §9): a row written in the same transaction as the
/// triggering build insert, drained by a lightweight poller that calls
/// `Engine::schedule`. Replaces the Go original's `Build.AfterCreate` model
/// hook and its associated `ErrInvalidBuild` retry hack.
#[async_trait]
pub trait OutboxRepo: Send + Sync {
    async fn enqueue(&self, tx: &mut Transaction<'_, Postgres>, build_key: &str) -> DbResult<()>;

    /// Claims unprocessed rows oldest-first and marks them processed in the
    /// same statement, so a crashed poller doesn't redeliver forever but a
    /// live one never double-delivers within a single poll.
    async fn claim_batch(&self, limit: i64) -> DbResult<Vec<String>>;
}

pub struct PgOutboxRepo {
    pool: PgPool,
}

impl PgOutboxRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepo for PgOutboxRepo {
    async fn enqueue(&self, tx: &mut Transaction<'_, Postgres>, build_key: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO outbox (id, build_key, created_at) VALUES ($1, $2, $3)")
            .bind(Uuid::now_v7())
            .bind(build_key)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn claim_batch(&self, limit: i64) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE outbox SET processed_at = now()
            WHERE id IN (
                SELECT id FROM outbox
                WHERE processed_at IS NULL
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING build_key
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
