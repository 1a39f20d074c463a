use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for forgecd_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => forgecd_core::Error::Conflict(msg),
            other => forgecd_core::Error::Database(other.to_string()),
        }
    }
}
