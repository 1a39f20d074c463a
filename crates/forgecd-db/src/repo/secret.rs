use async_trait::async_trait;
use forgecd_core::ScopedEntry;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait SecretRepo: Send + Sync {
    async fn create(&self, entry: ScopedEntry) -> DbResult<()>;

    /// Shadowed resolution for a `(project, pipeline)` scope: the most
    /// specific scope wins per key (spec §3, §4.5 step 4). Grounded on the
    /// original's "order by specificity, take the first row per key" rule;
    /// expressed here as `DISTINCT ON (key)` ordered by specificity
    /// descending, which produces the same pipeline > project > global
    /// precedence.
    async fn resolve(&self, project: &str, pipeline: &str) -> DbResult<Vec<ScopedEntry>>;
}

pub struct PgSecretRepo {
    pool: PgPool,
}

impl PgSecretRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SecretRow {
    key: String,
    project_name: Option<String>,
    pipeline_name: Option<String>,
    path: Option<String>,
}

impl From<SecretRow> for ScopedEntry {
    fn from(row: SecretRow) -> Self {
        ScopedEntry {
            key: row.key,
            project_name: row.project_name,
            pipeline_name: row.pipeline_name,
            path: row.path,
        }
    }
}

#[async_trait]
impl SecretRepo for PgSecretRepo {
    async fn create(&self, entry: ScopedEntry) -> DbResult<()> {
        ScopedEntry::validate_key(&entry.key).map_err(DbError::Conflict)?;
        sqlx::query(
            "INSERT INTO secrets (id, key, project_name, pipeline_name, path)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(&entry.key)
        .bind(&entry.project_name)
        .bind(&entry.pipeline_name)
        .bind(&entry.path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve(&self, project: &str, pipeline: &str) -> DbResult<Vec<ScopedEntry>> {
        let rows = sqlx::query_as::<_, SecretRow>(
            r#"
            SELECT DISTINCT ON (key) key, project_name, pipeline_name, path
            FROM secrets
            WHERE project_name IS NULL
               OR (project_name = $1 AND pipeline_name IS NULL)
               OR (project_name = $1 AND pipeline_name = $2)
            ORDER BY key,
                     (project_name IS NOT NULL) DESC,
                     (pipeline_name IS NOT NULL) DESC
            "#,
        )
        .bind(project)
        .bind(pipeline)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ScopedEntry::from).collect())
    }
}
