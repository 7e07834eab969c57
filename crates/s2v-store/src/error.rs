//! Entity store error types.

use s2v_models::TransitionError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    /// A transition command rejected the update; the entity is unchanged.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Optimistic concurrency retries exhausted.
    #[error("Update conflict: {0}")]
    Conflict(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

impl StoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Map an HTTP status from the backend to an error.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            412 => Self::PreconditionFailed(msg),
            429 => Self::RateLimited(1000),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status equivalent, used for request metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) | Self::Conflict(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::RequestFailed(_) => Some(400),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-suggested backoff, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Network(_) | StoreError::RateLimited(_) | StoreError::ServerError(_, _)
        )
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed(_))
            || matches!(
                self,
                StoreError::RequestFailed(msg)
                if msg.contains("FAILED_PRECONDITION") || msg.contains("Precondition")
            )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    /// True if a guard rejected the presented idempotency token.
    pub fn is_stale_token(&self) -> bool {
        matches!(self, StoreError::Transition(e) if e.is_stale_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_http_status() {
        assert!(matches!(StoreError::from_http_status(429, "x"), StoreError::RateLimited(_)));
        assert!(matches!(StoreError::from_http_status(503, "x"), StoreError::ServerError(503, _)));
        assert!(matches!(StoreError::from_http_status(404, "x"), StoreError::NotFound(_)));
        assert!(matches!(StoreError::from_http_status(409, "x"), StoreError::AlreadyExists(_)));
        assert!(matches!(StoreError::from_http_status(400, "x"), StoreError::RequestFailed(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::from_http_status(500, "x").is_retryable());
        assert!(StoreError::RateLimited(10).is_retryable());
        assert!(!StoreError::from_http_status(400, "x").is_retryable());
        assert!(!StoreError::not_found("x").is_retryable());
        assert!(!StoreError::Conflict("x".into()).is_retryable());
    }

    #[test]
    fn test_precondition_detection() {
        assert!(StoreError::PreconditionFailed("x".into()).is_precondition_failed());
        assert!(StoreError::request_failed("status FAILED_PRECONDITION").is_precondition_failed());
        assert!(!StoreError::request_failed("bad field").is_precondition_failed());
    }

    #[test]
    fn test_stale_token_detection() {
        let err: StoreError = TransitionError::StaleToken("running").into();
        assert!(err.is_stale_token());
        let err: StoreError = TransitionError::validation("empty").into();
        assert!(!err.is_stale_token());
    }

    #[test]
    fn test_http_status_getter() {
        assert_eq!(StoreError::RateLimited(1000).http_status(), Some(429));
        assert_eq!(StoreError::ServerError(502, "x".into()).http_status(), Some(502));
        assert_eq!(StoreError::RateLimited(5000).retry_after_ms(), Some(5000));
        assert_eq!(StoreError::not_found("x").retry_after_ms(), None);
    }
}
