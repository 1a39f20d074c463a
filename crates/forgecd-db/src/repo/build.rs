use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgecd_core::{Build, BuildKey, BuildLog, BuildStatus, BuildStep};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait BuildRepo: Send + Sync {
    /// Creates a build with `number = max(existing for pipeline) + 1`
    /// (spec §3).
    async fn create(&self, project: &str, pipeline: &str, now: DateTime<Utc>) -> DbResult<Build>;

    async fn get(&self, key: &BuildKey) -> DbResult<Build>;

    async fn status(&self, key: &BuildKey) -> DbResult<BuildStatus>;

    /// Plain `UPDATE`, not an ORM hook (spec §6: "`UpdateColumn(s)`
    /// semantics that do not fire model hooks, to avoid re-entrancy").
    /// Enforces the legal-transition table (spec §3) via
    /// `BuildStatus::can_transition_to`, returning `DbError::Conflict` on an
    /// illegal one. Setting the status already in place is a no-op, not a
    /// conflict.
    async fn set_status(&self, key: &BuildKey, status: BuildStatus) -> DbResult<()>;

    async fn set_worker(&self, key: &BuildKey, worker_name: &str) -> DbResult<()>;

    /// Appends a new step and returns its storage id.
    async fn open_step(
        &self,
        key: &BuildKey,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> DbResult<Uuid>;

    async fn append_log(&self, step_id: Uuid, log: BuildLog) -> DbResult<()>;

    /// Appends output to the last log of the step (spec §3).
    async fn append_output(&self, step_id: Uuid, line: &str) -> DbResult<()>;

    async fn close_step(&self, step_id: Uuid, finished_at: DateTime<Utc>) -> DbResult<()>;

    /// Transaction-scoped counterpart of `set_status`, for callers (the
    /// Binder) that must keep this write atomic with other writes made in
    /// the same transaction (spec §4.4, §5).
    async fn set_status_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &BuildKey,
        status: BuildStatus,
    ) -> DbResult<()>;

    async fn set_worker_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &BuildKey,
        worker_name: &str,
    ) -> DbResult<()>;

    async fn append_log_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        step_id: Uuid,
        log: BuildLog,
    ) -> DbResult<()>;

    async fn close_step_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        step_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> DbResult<()>;
}

pub struct PgBuildRepo {
    pool: PgPool,
}

impl PgBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BuildRow {
    project_name: String,
    pipeline_name: String,
    number: i64,
    status: String,
    worker_name: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    name: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    logs: serde_json::Value,
}

fn parse_status(s: &str) -> DbResult<BuildStatus> {
    Ok(match s {
        "scheduled" => BuildStatus::Scheduled,
        "running" => BuildStatus::Running,
        "successful" => BuildStatus::Successful,
        "failed" => BuildStatus::Failed,
        "canceled" => BuildStatus::Canceled,
        other => return Err(DbError::Conflict(format!("unknown build status {other:?}"))),
    })
}

fn status_str(status: BuildStatus) -> &'static str {
    match status {
        BuildStatus::Scheduled => "scheduled",
        BuildStatus::Running => "running",
        BuildStatus::Successful => "successful",
        BuildStatus::Failed => "failed",
        BuildStatus::Canceled => "canceled",
    }
}

#[async_trait]
impl BuildRepo for PgBuildRepo {
    async fn create(&self, project: &str, pipeline: &str, now: DateTime<Utc>) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            INSERT INTO builds (project_name, pipeline_name, number, status, created_at)
            VALUES (
                $1, $2,
                (SELECT COALESCE(MAX(number), 0) + 1 FROM builds
                 WHERE project_name = $1 AND pipeline_name = $2),
                'scheduled', $3
            )
            RETURNING project_name, pipeline_name, number, status, worker_name, created_at
            "#,
        )
        .bind(project)
        .bind(pipeline)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Build {
            key: BuildKey::new(row.project_name, row.pipeline_name, row.number),
            status: parse_status(&row.status)?,
            worker_name: row.worker_name,
            steps: Vec::new(),
            created_at: row.created_at,
        })
    }

    async fn get(&self, key: &BuildKey) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(
            "SELECT project_name, pipeline_name, number, status, worker_name, created_at
             FROM builds WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build {key}")))?;

        let step_rows = sqlx::query_as::<_, StepRow>(
            "SELECT id, name, started_at, finished_at, logs FROM build_steps
             WHERE project_name = $1 AND pipeline_name = $2 AND number = $3
             ORDER BY seq ASC",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .fetch_all(&self.pool)
        .await?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for row in step_rows {
            let logs: Vec<BuildLog> = serde_json::from_value(row.logs)
                .map_err(|e| DbError::Conflict(format!("malformed step logs: {e}")))?;
            steps.push(BuildStep {
                name: row.name,
                started_at: row.started_at,
                finished_at: row.finished_at,
                logs,
            });
        }

        Ok(Build {
            key: key.clone(),
            status: parse_status(&row.status)?,
            worker_name: row.worker_name,
            steps,
            created_at: row.created_at,
        })
    }

    async fn status(&self, key: &BuildKey) -> DbResult<BuildStatus> {
        let status: String = sqlx::query_scalar(
            "SELECT status FROM builds WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build {key}")))?;
        parse_status(&status)
    }

    async fn set_status(&self, key: &BuildKey, status: BuildStatus) -> DbResult<()> {
        let current = self.status(key).await?;
        if current == status {
            return Ok(());
        }
        if !current.can_transition_to(status) {
            return Err(DbError::Conflict(format!(
                "illegal build status transition {current} -> {status} for {key}"
            )));
        }
        sqlx::query(
            "UPDATE builds SET status = $4
             WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .bind(status_str(status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_worker(&self, key: &BuildKey, worker_name: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE builds SET worker_name = $4
             WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .bind(worker_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_step(
        &self,
        key: &BuildKey,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> DbResult<Uuid> {
        let id = Uuid::now_v7();
        let seq: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM build_steps
             WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO build_steps (id, project_name, pipeline_name, number, seq, name, started_at, logs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, '[]')",
        )
        .bind(id)
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .bind(seq)
        .bind(name)
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn append_log(&self, step_id: Uuid, log: BuildLog) -> DbResult<()> {
        let logs_json: serde_json::Value = sqlx::query_scalar(
            "SELECT logs FROM build_steps WHERE id = $1",
        )
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build step {step_id}")))?;

        let mut logs: Vec<BuildLog> = serde_json::from_value(logs_json)
            .map_err(|e| DbError::Conflict(format!("malformed step logs: {e}")))?;
        logs.push(log);
        let logs_json = serde_json::to_value(&logs)
            .map_err(|e| DbError::Conflict(format!("failed to serialize step logs: {e}")))?;

        sqlx::query("UPDATE build_steps SET logs = $2 WHERE id = $1")
            .bind(step_id)
            .bind(logs_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_output(&self, step_id: Uuid, line: &str) -> DbResult<()> {
        let logs_json: serde_json::Value = sqlx::query_scalar(
            "SELECT logs FROM build_steps WHERE id = $1",
        )
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build step {step_id}")))?;

        let mut logs: Vec<BuildLog> = serde_json::from_value(logs_json)
            .map_err(|e| DbError::Conflict(format!("malformed step logs: {e}")))?;
        if let Some(last) = logs.last_mut() {
            last.append_output(line);
        }
        let logs_json = serde_json::to_value(&logs)
            .map_err(|e| DbError::Conflict(format!("failed to serialize step logs: {e}")))?;

        sqlx::query("UPDATE build_steps SET logs = $2 WHERE id = $1")
            .bind(step_id)
            .bind(logs_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close_step(&self, step_id: Uuid, finished_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE build_steps SET finished_at = $2 WHERE id = $1")
            .bind(step_id)
            .bind(finished_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &BuildKey,
        status: BuildStatus,
    ) -> DbResult<()> {
        let current: String = sqlx::query_scalar(
            "SELECT status FROM builds WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("build {key}")))?;
        let current = parse_status(&current)?;

        if current == status {
            return Ok(());
        }
        if !current.can_transition_to(status) {
            return Err(DbError::Conflict(format!(
                "illegal build status transition {current} -> {status} for {key}"
            )));
        }

        sqlx::query(
            "UPDATE builds SET status = $4
             WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .bind(status_str(status))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_worker_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &BuildKey,
        worker_name: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE builds SET worker_name = $4
             WHERE project_name = $1 AND pipeline_name = $2 AND number = $3",
        )
        .bind(&key.project)
        .bind(&key.pipeline)
        .bind(key.number)
        .bind(worker_name)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn append_log_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        step_id: Uuid,
        log: BuildLog,
    ) -> DbResult<()> {
        let logs_json: serde_json::Value = sqlx::query_scalar("SELECT logs FROM build_steps WHERE id = $1")
            .bind(step_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("build step {step_id}")))?;

        let mut logs: Vec<BuildLog> = serde_json::from_value(logs_json)
            .map_err(|e| DbError::Conflict(format!("malformed step logs: {e}")))?;
        logs.push(log);
        let logs_json = serde_json::to_value(&logs)
            .map_err(|e| DbError::Conflict(format!("failed to serialize step logs: {e}")))?;

        sqlx::query("UPDATE build_steps SET logs = $2 WHERE id = $1")
            .bind(step_id)
            .bind(logs_json)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn close_step_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        step_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE build_steps SET finished_at = $2 WHERE id = $1")
            .bind(step_id)
            .bind(finished_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
