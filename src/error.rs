use thiserror::Error;

/// Error kinds surfaced by the scheduler core.
///
/// Repositories return `NotFound` as a sentinel so callers can distinguish
/// an absent record from a backend failure. `QueueEmpty` is the internal
/// signal a blocked dequeue reports when the ambient cancellation fires;
/// the worker loop treats it as a clean shutdown.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("queue is empty")]
    QueueEmpty,

    #[error("operation cancelled")]
    Cancelled,

    #[error("backend failure: {0}")]
    Backend(String),
}

impl Error {
    pub fn invalid(rule: impl Into<String>) -> Self {
        Self::InvalidInput(rule.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Backend(format!("json serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
