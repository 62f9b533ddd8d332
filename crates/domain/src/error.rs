use serde::Serialize;

/// Shared error type used across all copilotz crates.
///
/// The first nine variants are the error kinds surfaced on a run handle;
/// the rest are plumbing conversions that get folded into one of those
/// kinds at the boundary where they occur.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("execution: {0}")]
    Execution(String),

    #[error("cancelled")]
    Cancelled,

    #[error("expired")]
    Expired,

    #[error("overwritten")]
    Overwritten,

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The stable error-kind discriminator surfaced to run consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    StorageError,
    ProviderError,
    ToolNotFound,
    ValidationError,
    ExecutionError,
    Cancelled,
    Expired,
    Overwritten,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Storage(_) | Error::Io(_) => ErrorKind::StorageError,
            Error::Provider { .. } | Error::Http(_) => ErrorKind::ProviderError,
            Error::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Execution(_) => ErrorKind::ExecutionError,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Expired => ErrorKind::Expired,
            Error::Overwritten => ErrorKind::Overwritten,
            Error::Json(_) | Error::Other(_) => ErrorKind::Other,
        }
    }
}
