use async_trait::async_trait;
use forgecd_core::{Pipeline, PipelineConfig};
use sqlx::PgPool;

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait PipelineRepo: Send + Sync {
    async fn get(&self, project_name: &str, name: &str) -> DbResult<Pipeline>;
}

pub struct PgPipelineRepo {
    pool: PgPool,
}

impl PgPipelineRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PipelineRow {
    project_name: String,
    name: String,
    branch: String,
    config: serde_json::Value,
}

impl PipelineRow {
    fn into_pipeline(self) -> DbResult<Pipeline> {
        let config: PipelineConfig = serde_json::from_value(self.config)
            .map_err(|e| DbError::Conflict(format!("malformed pipeline config: {e}")))?;
        Ok(Pipeline {
            project_name: self.project_name,
            name: self.name,
            branch: self.branch,
            config,
        })
    }
}

#[async_trait]
impl PipelineRepo for PgPipelineRepo {
    async fn get(&self, project_name: &str, name: &str) -> DbResult<Pipeline> {
        let row = sqlx::query_as::<_, PipelineRow>(
            "SELECT project_name, name, branch, config FROM pipelines
             WHERE project_name = $1 AND name = $2",
        )
        .bind(project_name)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("pipeline {project_name}/{name}")))?;
        row.into_pipeline()
    }
}
