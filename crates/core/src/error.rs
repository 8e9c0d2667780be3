//! Store error model.

use thiserror::Error;

/// Result type used across the persistence core.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence error.
///
/// Every failure in the core is returned synchronously with one of these
/// categories. The split matters to callers of `append`: a `Concurrency` error
/// means the caller's view of the aggregate is stale and the *command* can be
/// retried after re-reading state, while a `Storage` error means the backing
/// store itself failed and retrying will not help.
///
/// ## Categories
///
/// - **Concurrency**: version contiguity check failed at append
/// - **Configuration**: invalid batch count, missing roles, malformed settings
/// - **Storage**: anything coming out of the backing document store (opaque)
/// - **NotFound**: a lookup found no row; callers decide whether that is an error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::Concurrency(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// `true` when re-reading state and re-running the command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("payload serialization failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrency_is_retryable() {
        assert!(StoreError::concurrency("stale").is_retryable());
        assert!(!StoreError::storage("disk full").is_retryable());
        assert!(!StoreError::configuration("count must be positive").is_retryable());
        assert!(!StoreError::not_found("sequence").is_retryable());
    }

    #[test]
    fn display_includes_category() {
        let err = StoreError::storage("collection create failed");
        assert_eq!(err.to_string(), "storage error: collection create failed");
    }
}
