use async_trait::async_trait;
use forgecd_core::{Resolved, ScopedEntry};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait VariableRepo: Send + Sync {
    async fn create(&self, entry: ScopedEntry, value: String) -> DbResult<()>;

    /// Shadowed resolution, identical precedence to `SecretRepo::resolve`
    /// but also projecting `value` (spec §4.5 step 5).
    async fn resolve(&self, project: &str, pipeline: &str) -> DbResult<Vec<Resolved<String>>>;
}

pub struct PgVariableRepo {
    pool: PgPool,
}

impl PgVariableRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VariableRow {
    key: String,
    path: Option<String>,
    value: String,
}

#[async_trait]
impl VariableRepo for PgVariableRepo {
    async fn create(&self, entry: ScopedEntry, value: String) -> DbResult<()> {
        ScopedEntry::validate_key(&entry.key).map_err(DbError::Conflict)?;
        sqlx::query(
            "INSERT INTO variables (id, key, project_name, pipeline_name, path, value)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(&entry.key)
        .bind(&entry.project_name)
        .bind(&entry.pipeline_name)
        .bind(&entry.path)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve(&self, project: &str, pipeline: &str) -> DbResult<Vec<Resolved<String>>> {
        let rows = sqlx::query_as::<_, VariableRow>(
            r#"
            SELECT DISTINCT ON (key) key, path, value
            FROM variables
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
        Ok(rows
            .into_iter()
            .map(|r| Resolved {
                key: r.key,
                path: r.path,
                value: r.value,
            })
            .collect())
    }
}
