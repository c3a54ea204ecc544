//! Error types shared by every access-control component
//!
//! This module defines the error taxonomy used across the org directory,
//! the policy evaluator and the content feed. Callers can always tell a
//! denied request apart from one that could not be decided.

use thiserror::Error;

/// Access engine error types.
///
/// `Forbidden` and `NotFound` are intentionally distinct, and a store
/// failure is never folded into a deny: it surfaces as `TransientStore`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// Malformed input the client can fix (path, action, cursor, limit)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced org node, membership, policy or content item is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate active membership, duplicate org path, and similar
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller is not allowed to perform this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The store timed out or is unreachable; safe to retry with backoff
    #[error("Store unavailable: {0}")]
    TransientStore(String),

    /// Broken invariant inside the engine
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for access engine operations.
pub type AccessResult<T> = Result<T, AccessError>;

impl AccessError {
    /// Build a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Build a forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Build a transient store error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientStore(msg.into())
    }

    /// Check if the failed operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::TransientStore(_))
    }

    /// Check if this error should be logged at error level.
    ///
    /// Validation, not-found, conflict and forbidden outcomes are expected
    /// and belong to the caller.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AccessError::TransientStore(_) | AccessError::Internal(_)
        )
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Validation(_) => 400,
            AccessError::Forbidden(_) => 403,
            AccessError::NotFound(_) => 404,
            AccessError::Conflict(_) => 409,
            AccessError::TransientStore(_) => 503,
            AccessError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AccessError::Validation(_) => "VALIDATION_ERROR",
            AccessError::NotFound(_) => "NOT_FOUND",
            AccessError::Conflict(_) => "CONFLICT",
            AccessError::Forbidden(_) => "FORBIDDEN",
            AccessError::TransientStore(_) => "STORE_UNAVAILABLE",
            AccessError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
