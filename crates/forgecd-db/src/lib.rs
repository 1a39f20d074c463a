pub mod error;
pub mod repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use error::{DbError, DbResult};
pub use repo::*;

pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
