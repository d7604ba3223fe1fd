use std::time::Duration;
use thiserror::Error;

use super::config::BackendKind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Missing or malformed caller input; never reaches a backend
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Connection error ({backend}): {message}")]
    Connection { backend: BackendKind, message: String },

    #[error("{0} connection not established")]
    NotConnected(BackendKind),

    #[error("Unsupported operation: {verb} for {backend}")]
    UnsupportedOperation { verb: String, backend: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Native driver error, kept verbatim behind the operation context
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unsupported(verb: impl Into<String>, backend: impl ToString) -> Self {
        Self::UnsupportedOperation {
            verb: verb.into(),
            backend: backend.to_string(),
        }
    }

    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Connection { .. } => "connection_error",
            Self::NotConnected(_) => "not_connected",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::NotFound(_) => "not_found",
            Self::Backend { .. } => "backend_execution_error",
            Self::Timeout(_) => "timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
