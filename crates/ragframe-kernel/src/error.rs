//! Error types shared by every retrieval and generation backend.
//!
//! [`RagError`] is what a collaborator (retriever, generator, embedder)
//! reports. [`QueryError`] is what the orchestrator reports to its caller: it
//! wraps a collaborator error with the stage that produced it.

use thiserror::Error;

/// Result type returned by collaborators.
pub type RagResult<T> = Result<T, RagError>;

/// Collaborator-level error taxonomy.
///
/// Every variant is terminal for the call that produced it. Nothing in this
/// workspace retries on its own.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RagError {
    /// Malformed caller input, rejected before any I/O.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transport could not reach the backend.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend answered with a non-success status.
    #[error("Backend '{backend}' error (status: {status:?}): {message}")]
    Backend {
        backend: String,
        status: Option<u16>,
        message: String,
    },

    /// Backend answered, but the payload could not be understood.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The caller's cancellation signal (or deadline) fired.
    #[error("Operation cancelled")]
    Cancelled,
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn backend(backend: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Decode(err.to_string())
    }
}

/// Orchestrator-level error with stage attribution.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// Query or options were rejected before any collaborator was called.
    #[error("Invalid query: {0}")]
    Validation(String),

    /// The retrieval stage failed and no fallback applied.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] RagError),

    /// Retrieval succeeded but returned nothing, and no hybrid fallback
    /// applied.
    #[error("No context retrieved for query")]
    NoContext,

    /// The generation stage failed. There is no fallback for this stage.
    #[error("Generation failed: {0}")]
    Generation(#[source] RagError),
}

impl QueryError {
    /// The collaborator error behind a stage failure, if any.
    pub fn cause(&self) -> Option<&RagError> {
        match self {
            Self::Validation(_) | Self::NoContext => None,
            Self::Retrieval(err) | Self::Generation(err) => Some(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some_and(RagError::is_cancelled)
    }

    /// Wrap an option-resolution failure.
    pub(crate) fn invalid(err: RagError) -> Self {
        match err {
            RagError::Validation(message) => Self::Validation(message),
            other => Self::Validation(other.to_string()),
        }
    }
}
