//! ARM client errors.

use thiserror::Error;

pub type ArmResult<T> = Result<T, ArmError>;

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned {status}: {body}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("long-running operation {0}")]
    OperationFailed(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}
