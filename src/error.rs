//! Error taxonomy shared by all core operations

use thiserror::Error;

/// Structured error surfaced to callers of the quiz and mastery operations.
///
/// The request-level kinds mirror the precondition taxonomy of the calling
/// surface; `Storage` and `Encoding` wrap the store and serialization layers.
/// Callers receive a kind plus message, never internal state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request shape (missing field, bad mode or count).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Authenticated caller lacks the required role or ownership.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Referenced entity is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Valid request against invalid current state (e.g. double submission).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Duplicate creation attempt.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Content file could not be parsed.
    #[error("import failed: {0}")]
    Import(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
