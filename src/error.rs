//! Quota Error Types
//!
//! This module defines the error types returned by the usage tracker, the
//! catalog and the usage stores. The HTTP layer maps each variant to a
//! status code.

/// Error types for quota operations
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The named resource is not in the catalog
    #[error("model not found: {0}")]
    UnknownResource(String),

    /// Malformed input (delta, selection request)
    #[error("invalid request: {0}")]
    Validation(String),

    /// Selection request that can never pick anything
    #[error("modelPriority and fallbackAll cannot be both falsy. you cannot choose any model that way")]
    InvalidSelection,

    /// Usage store failed or is unreachable
    #[error("usage store unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Usage store call exceeded its deadline
    #[error("usage store timed out after {0}ms")]
    Timeout(u64),

    /// Usage store answered with a permanent error
    #[error("usage store rejected the request with status {status}: {message}")]
    StoreRejected { status: u16, message: String },

    /// Catalog could not be loaded or failed validation
    #[error("invalid catalog: {0}")]
    Catalog(String),
}

impl QuotaError {
    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuotaError::PersistenceUnavailable(_) | QuotaError::Timeout(_)
        )
    }

    /// Whether the error was caused by the request itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QuotaError::UnknownResource(_) | QuotaError::Validation(_) | QuotaError::InvalidSelection
        )
    }
}

pub type Result<T> = std::result::Result<T, QuotaError>;
