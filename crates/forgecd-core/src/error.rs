use thiserror::Error;

/// Error taxonomy for the build orchestration core.
///
/// Variants are semantic (what went wrong), not type-named, so the engine
/// loop can pattern-match on the handful of cases that change control flow
/// (`InvalidBuild` is retryable once; `NoAvailableWorker` stops a bind tick;
/// `NoAvailableWorkerForConfiguration` only skips one element).
#[derive(Debug, Error)]
pub enum Error {
    #[error("build {0} not found")]
    InvalidBuild(String),

    #[error("pipeline {project}/{pipeline} not found")]
    InvalidPipeline { project: String, pipeline: String },

    #[error("project {0} not found")]
    InvalidProject(String),

    #[error("failed to resolve secrets: {0}")]
    InvalidSecrets(String),

    #[error("failed to resolve variables: {0}")]
    InvalidVariables(String),

    #[error("no available worker")]
    NoAvailableWorker,

    #[error("no available worker for this pipeline's configuration")]
    NoAvailableWorkerForConfiguration,

    #[error("build failed")]
    BuildFailed,

    #[error("build cancelled")]
    BuildCancelled,

    #[error("unsupported system {0:?} (only \"linux\" is supported)")]
    UnsupportedSystem(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("secret store error: {0}")]
    SecretStore(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
