//! Error taxonomy for retrieval and reconstruction.
//!
//! Every failure a retrieval call can surface is a [`RetrievalError`].
//! Callers that only care about the broad class (for status codes or
//! retry policy) use [`RetrievalError::kind`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors returned by the accessor and the retrieval operations.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// A parameter failed validation. Raised before any backend call.
    #[error("invalid argument `{param}`: {reason}")]
    InvalidArgument { param: &'static str, reason: String },

    /// The regex pattern does not compile.
    #[error("invalid argument `pattern`: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The chunk store or the embedding service could not be reached.
    #[error("{service} unavailable: {message}")]
    BackendUnavailable {
        service: &'static str,
        message: String,
    },

    /// The chunk store was reachable but refused the query.
    #[error("chunk store rejected query (HTTP {status}): {message}")]
    QueryRejected { status: u16, message: String },

    /// The embedder and the index disagree on vector dimensionality.
    #[error("embedding dimension mismatch: embedder produces {embedder}, index stores {store}")]
    DimensionMismatch { embedder: usize, store: usize },

    /// No chunks exist for the requested file.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The caller cancelled the operation (or its deadline passed).
    #[error("operation cancelled")]
    Cancelled,
}

/// Broad error class, used for HTTP status mapping and caller policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    BackendUnavailable,
    NotFound,
    Cancelled,
}

impl RetrievalError {
    /// Shorthand for [`RetrievalError::InvalidArgument`].
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }

    /// Shorthand for a chunk store [`RetrievalError::BackendUnavailable`].
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            service: "chunk store",
            message: message.into(),
        }
    }

    /// Shorthand for an embedding service [`RetrievalError::BackendUnavailable`].
    pub fn embedding_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            service: "embedding service",
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::InvalidPattern(_) | Self::DimensionMismatch { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::BackendUnavailable { .. } | Self::QueryRejected { .. } => {
                ErrorKind::BackendUnavailable
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
