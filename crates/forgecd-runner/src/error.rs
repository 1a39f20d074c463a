use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Sentinel `ERR_TERM` seen — the command exited non-zero (spec §4.1).
    #[error("command failed")]
    BuildFailed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("runner construction failed: {0}")]
    Construction(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
