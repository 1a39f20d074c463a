use async_trait::async_trait;
use forgecd_core::Project;
use sqlx::PgPool;

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn get(&self, name: &str) -> DbResult<Project>;
}

pub struct PgProjectRepo {
    pool: PgPool,
}

impl PgProjectRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    name: String,
    repo: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            name: row.name,
            repo: row.repo,
        }
    }
}

#[async_trait]
impl ProjectRepo for PgProjectRepo {
    async fn get(&self, name: &str) -> DbResult<Project> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT name, repo FROM projects WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("project {name}")))?;
        Ok(row.into())
    }
}
