//! In-process entity store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use s2v_models::TransitionPlan;
use tokio::sync::Mutex;
use tracing::debug;

use crate::entity::{Entity, EntityKey};
use crate::error::{StoreError, StoreResult};
use crate::store::EntityStore;

/// Entity store backed by an ordered map behind one async mutex.
///
/// Every operation holds the lock for its whole load-apply-store sequence, so
/// updates and deletes are linearizable.
pub struct MemoryStore<T> {
    entities: Mutex<BTreeMap<EntityKey, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.lock().await.is_empty()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity + Clone> EntityStore<T> for MemoryStore<T> {
    async fn create(&self, entity: T) -> StoreResult<T> {
        let key = entity.key();
        let mut entities = self.entities.lock().await;
        if entities.contains_key(&key) {
            return Err(StoreError::already_exists(format!("{}/{}", T::COLLECTION, key)));
        }
        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn get(&self, key: &EntityKey) -> StoreResult<T> {
        self.entities
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("{}/{}", T::COLLECTION, key)))
    }

    async fn list(&self, parent: Option<&str>, limit: Option<usize>) -> StoreResult<Vec<T>> {
        let entities = self.entities.lock().await;
        let matching = entities
            .iter()
            .filter(|(key, _)| key.parent.as_deref() == parent)
            .map(|(_, entity)| entity.clone());
        Ok(match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn update(&self, key: &EntityKey, plan: &TransitionPlan) -> StoreResult<T> {
        let mut entities = self.entities.lock().await;
        let entity = entities
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(format!("{}/{}", T::COLLECTION, key)))?;
        plan.apply(entity)?;
        debug!(collection = T::COLLECTION, key = %key, commands = ?plan.describe(), "Entity updated");
        Ok(entity.clone())
    }

    async fn delete(&self, key: &EntityKey) -> StoreResult<()> {
        match self.entities.lock().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(format!("{}/{}", T::COLLECTION, key))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use s2v_models::{
        Project, ProjectId, StageStatus, Transition, TransitionError, VideoSegment,
    };

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::<Project>::new();
        let project = store.create(Project::new("deck.pdf")).await.unwrap();

        let loaded = store.get(&project.key()).await.unwrap();
        assert_eq!(loaded, project);

        let err = store.create(project.clone()).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::<Project>::new();
        assert!(store.get(&EntityKey::root("nope")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_by_parent() {
        let store = MemoryStore::<VideoSegment>::new();
        let p1 = ProjectId::from_string("p1");
        let p2 = ProjectId::from_string("p2");
        for order in 1..=3 {
            store.create(VideoSegment::new(p1.clone(), "img", order)).await.unwrap();
        }
        store.create(VideoSegment::new(p2, "img", 1)).await.unwrap();

        assert_eq!(store.list(Some("p1"), None).await.unwrap().len(), 3);
        assert_eq!(store.list(Some("p1"), Some(2)).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("p2"), None).await.unwrap().len(), 1);
        assert!(store.list(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_entity() {
        let store = MemoryStore::<Project>::new();
        let project = store.create(Project::new("deck.pdf")).await.unwrap();

        let plan = TransitionPlan::new()
            .then(Transition::SetStatus(StageStatus::Running))
            .then(Transition::AttachSegments(vec![]));
        let err = store.update(&project.key(), &plan).await.unwrap_err();
        assert!(matches!(err, StoreError::Transition(TransitionError::Validation(_))));

        assert_eq!(store.get(&project.key()).await.unwrap(), project);
    }

    #[tokio::test]
    async fn test_concurrent_token_clears_apply_once() {
        let store = Arc::new(MemoryStore::<Project>::new());
        let project = store.create(Project::new("deck.pdf")).await.unwrap();
        let key = project.key();
        let token = project.stage.running_token.clone().unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let key = key.clone();
            let plan = TransitionPlan::new()
                .then(Transition::ClearRunningToken(token.clone()))
                .then(Transition::SetStatus(StageStatus::Running));
            handles.push(tokio::spawn(async move { store.update(&key, &plan).await }));
        }

        let results = futures::future::join_all(handles).await;
        let applied = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_delete_is_first_wins() {
        let store = MemoryStore::<Project>::new();
        let project = store.create(Project::new("deck.pdf")).await.unwrap();

        store.delete(&project.key()).await.unwrap();
        assert!(store.delete(&project.key()).await.unwrap_err().is_not_found());
    }
}
