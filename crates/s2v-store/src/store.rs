//! The entity store contract.

use async_trait::async_trait;
use s2v_models::TransitionPlan;

use crate::entity::{Entity, EntityKey};
use crate::error::StoreResult;

/// Transactional key-value persistence for one entity type.
///
/// `update` is the only mutation path: it loads the entity, applies the plan
/// and persists the result as one atomic step. Two concurrent updates of the
/// same key never interleave, and a failing command leaves the stored entity
/// unchanged.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Persist a new entity. Fails with `AlreadyExists` on key collision.
    async fn create(&self, entity: T) -> StoreResult<T>;

    /// Fails with `NotFound` when missing.
    async fn get(&self, key: &EntityKey) -> StoreResult<T>;

    /// Entities under `parent` (or root entities), ordered by id.
    async fn list(&self, parent: Option<&str>, limit: Option<usize>) -> StoreResult<Vec<T>>;

    /// Apply `plan` atomically and return the stored result.
    async fn update(&self, key: &EntityKey, plan: &TransitionPlan) -> StoreResult<T>;

    /// Remove an entity. The first of two racing deletes wins, the other
    /// observes `NotFound`.
    async fn delete(&self, key: &EntityKey) -> StoreResult<()>;
}
