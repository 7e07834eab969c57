//! Pipeline error types.

use s2v_models::TransitionError;
use s2v_queue::QueueError;
use s2v_store::StoreError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Entity or watcher missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Replayed callback; already handled.
    #[error("Stale token: {0}")]
    StaleToken(String),

    /// Malformed input; nothing was changed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Backward or skipping status change; nothing was changed.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Invariant violation detected by the reconciler or gateway.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Enqueue failed; the current request is aborted.
    #[error("Transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Transition(TransitionError::StaleToken(which)) => {
                Self::StaleToken(format!("{} token already consumed", which))
            }
            StoreError::Transition(e @ TransitionError::Validation(_)) => {
                Self::Validation(e.to_string())
            }
            StoreError::Transition(e @ TransitionError::InvalidTransition { .. }) => {
                Self::InvalidTransition(e.to_string())
            }
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2v_models::StageStatus;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        assert!(matches!(
            PipelineError::from(StoreError::not_found("projects/p")),
            PipelineError::NotFound(_)
        ));
        assert!(matches!(
            PipelineError::from(StoreError::from(TransitionError::StaleToken("complete"))),
            PipelineError::StaleToken(_)
        ));
        assert!(matches!(
            PipelineError::from(StoreError::from(TransitionError::InvalidTransition {
                from: StageStatus::Completed,
                to: StageStatus::Running,
            })),
            PipelineError::InvalidTransition(_)
        ));
        assert!(matches!(
            PipelineError::from(StoreError::Conflict("x".into())),
            PipelineError::Store(_)
        ));
    }
}
