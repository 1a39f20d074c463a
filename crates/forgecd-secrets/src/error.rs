use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {0:?} not found")]
    NotFound(String),

    #[error("secret store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("secret store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed secret store response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;
