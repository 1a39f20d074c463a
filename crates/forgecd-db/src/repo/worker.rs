use async_trait::async_trait;
use forgecd_core::{Worker, WorkerStatus, WorkerStrategy};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait WorkerRepo: Send + Sync {
    /// Workers not currently marked `unreachable`, for the Binder's
    /// per-tick reload (spec §4.4 step 2 — "so reachability updates mid-tick
    /// are observed").
    async fn list_non_unreachable(&self) -> DbResult<Vec<Worker>>;

    /// All static (SSH) workers regardless of status, for the reachability
    /// prober, which must also observe currently-`unreachable` workers in
    /// order to clear that status on a successful probe.
    async fn list_static(&self) -> DbResult<Vec<Worker>>;

    /// Atomically increments `active_builds` and sets `status = used`
    /// (spec §4.4 step 3).
    async fn bind(&self, tx: &mut Transaction<'_, Postgres>, name: &str) -> DbResult<()>;

    /// Decrements `active_builds`; sets `status = idle` once it reaches 0
    /// (spec §4.4 `Unbind`).
    async fn unbind(&self, name: &str) -> DbResult<()>;

    /// Compensates a capacity increment when runner construction fails
    /// after `bind()` already ran (spec §8 scenario 5, §9).
    async fn compensate_failed_bind(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> DbResult<()>;

    async fn set_reachability(&self, name: &str, reachable: bool) -> DbResult<()>;
}

pub struct PgWorkerRepo {
    pool: PgPool,
}

impl PgWorkerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    name: String,
    address: String,
    system: String,
    username: String,
    is_static: bool,
    status: String,
    strategy: String,
    active_builds: i32,
    capacity: i32,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = DbError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "idle" => WorkerStatus::Idle,
            "used" => WorkerStatus::Used,
            "unreachable" => WorkerStatus::Unreachable,
            other => return Err(DbError::Conflict(format!("unknown worker status {other:?}"))),
        };
        let strategy = match row.strategy.as_str() {
            "min" => WorkerStrategy::Min,
            "balanced" => WorkerStrategy::Balanced,
            "max" => WorkerStrategy::Max,
            other => return Err(DbError::Conflict(format!("unknown worker strategy {other:?}"))),
        };
        Ok(Worker {
            name: row.name,
            address: row.address,
            system: row.system,
            username: row.username,
            is_static: row.is_static,
            status,
            strategy,
            active_builds: row.active_builds,
            capacity: row.capacity,
        })
    }
}

#[async_trait]
impl WorkerRepo for PgWorkerRepo {
    async fn list_non_unreachable(&self) -> DbResult<Vec<Worker>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            "SELECT name, address, system, username, is_static, status, strategy,
                    active_builds, capacity
             FROM workers WHERE status != 'unreachable'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn list_static(&self) -> DbResult<Vec<Worker>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            "SELECT name, address, system, username, is_static, status, strategy,
                    active_builds, capacity
             FROM workers WHERE is_static = true",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn bind(&self, tx: &mut Transaction<'_, Postgres>, name: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE workers SET active_builds = active_builds + 1, status = 'used'
             WHERE name = $1",
        )
        .bind(name)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn unbind(&self, name: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE workers
             SET active_builds = active_builds - 1,
                 status = CASE WHEN active_builds - 1 <= 0 THEN 'idle' ELSE status END
             WHERE name = $1",
        )
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn compensate_failed_bind(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE workers
             SET active_builds = active_builds - 1,
                 status = CASE WHEN active_builds - 1 <= 0 THEN 'idle' ELSE status END
             WHERE name = $1",
        )
        .bind(name)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_reachability(&self, name: &str, reachable: bool) -> DbResult<()> {
        if reachable {
            // Preserve idle/used derived from active_builds; only clear the
            // override (spec §3: "unreachable overrides both on probe failure").
            sqlx::query(
                "UPDATE workers
                 SET status = CASE WHEN active_builds > 0 THEN 'used' ELSE 'idle' END
                 WHERE name = $1 AND status = 'unreachable'",
            )
            .bind(name)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("UPDATE workers SET status = 'unreachable' WHERE name = $1")
                .bind(name)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
