//! Request handlers.

pub mod callbacks;
pub mod health;
pub mod projects;
pub mod segments;

pub use callbacks::*;
pub use health::*;
pub use projects::*;
pub use segments::*;

use crate::error::{ApiError, ApiResult};

/// Validate an entity id taken from the path.
///
/// Valid format: alphanumeric characters and hyphens only, 1-64 chars.
pub(crate) fn is_valid_entity_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub(crate) fn check_entity_id(kind: &str, id: &str) -> ApiResult<()> {
    if is_valid_entity_id(id) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Invalid {} id", kind)))
    }
}
