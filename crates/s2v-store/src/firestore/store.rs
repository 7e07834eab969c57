//! Firestore-backed entity store.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use s2v_models::TransitionPlan;
use tracing::{debug, warn};

use super::client::FirestoreClient;
use super::metrics::record_update_conflict;
use super::types::{Document, FromFirestoreValue, MapValue, ToFirestoreValue, Value};
use crate::entity::{collection_path, Entity, EntityKey};
use crate::error::{StoreError, StoreResult};
use crate::store::EntityStore;

/// Page size used when listing collections.
const LIST_PAGE_SIZE: u32 = 300;

/// Entity store over one Firestore collection (or subcollection family).
///
/// Updates are optimistic: read the document and its `updateTime`, apply the
/// plan, then write with an `updateTime` precondition. A lost race retries
/// from a fresh read.
pub struct FirestoreStore<T> {
    client: FirestoreClient,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for FirestoreStore<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> FirestoreStore<T> {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    fn collection(key: &EntityKey) -> String {
        collection_path::<T>(key.parent.as_deref())
    }
}

/// Encode an entity as Firestore document fields.
pub fn encode_entity<T: Entity>(entity: &T) -> StoreResult<HashMap<String, Value>> {
    match serde_json::to_value(entity)?.to_firestore_value() {
        Value::MapValue(MapValue { fields }) => Ok(fields.unwrap_or_default()),
        _ => Err(StoreError::SerializationError(format!(
            "{} did not serialize to a map",
            T::COLLECTION
        ))),
    }
}

/// Decode document fields into an entity.
pub fn decode_entity<T: Entity>(doc: &Document) -> StoreResult<T> {
    let map = Value::MapValue(MapValue {
        fields: doc.fields.clone(),
    });
    let json = serde_json::Value::from_firestore_value(&map).ok_or_else(|| {
        StoreError::InvalidResponse(format!(
            "unsupported field value in {}",
            doc.name.as_deref().unwrap_or(T::COLLECTION)
        ))
    })?;
    Ok(serde_json::from_value(json)?)
}

#[async_trait]
impl<T: Entity> EntityStore<T> for FirestoreStore<T> {
    async fn create(&self, entity: T) -> StoreResult<T> {
        let key = entity.key();
        let fields = encode_entity(&entity)?;
        self.client
            .create_document(&Self::collection(&key), &key.id, fields)
            .await?;
        Ok(entity)
    }

    async fn get(&self, key: &EntityKey) -> StoreResult<T> {
        let collection = Self::collection(key);
        let doc = self
            .client
            .with_retry("get_document", || self.client.get_document(&collection, &key.id))
            .await?
            .ok_or_else(|| StoreError::not_found(format!("{}/{}", collection, key.id)))?;
        decode_entity(&doc)
    }

    async fn list(&self, parent: Option<&str>, limit: Option<usize>) -> StoreResult<Vec<T>> {
        let collection = collection_path::<T>(parent);
        let mut entities = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = limit.map(|l| l.saturating_sub(entities.len()));
            if remaining == Some(0) {
                break;
            }
            let page_size = remaining
                .map(|r| (r as u32).min(LIST_PAGE_SIZE))
                .unwrap_or(LIST_PAGE_SIZE);

            let page = self
                .client
                .with_retry("list_documents", || {
                    self.client
                        .list_documents(&collection, Some(page_size), page_token.as_deref())
                })
                .await?;

            for doc in page.documents.iter().flatten() {
                entities.push(decode_entity(doc)?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(limit) = limit {
            entities.truncate(limit);
        }
        Ok(entities)
    }

    async fn update(&self, key: &EntityKey, plan: &TransitionPlan) -> StoreResult<T> {
        let collection = Self::collection(key);
        let attempts = self.client.config().conflict_retries.max(1);

        for attempt in 1..=attempts {
            let doc = self
                .client
                .with_retry("get_document", || self.client.get_document(&collection, &key.id))
                .await?
                .ok_or_else(|| StoreError::not_found(format!("{}/{}", collection, key.id)))?;

            let mut entity: T = decode_entity(&doc)?;
            plan.apply(&mut entity)?;
            let fields = encode_entity(&entity)?;

            match self
                .client
                .update_document_with_precondition(
                    &collection,
                    &key.id,
                    fields,
                    doc.update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    debug!(collection = %collection, key = %key, commands = ?plan.describe(), "Entity updated");
                    return Ok(entity);
                }
                Err(e) if e.is_precondition_failed() => {
                    record_update_conflict(T::COLLECTION);
                    warn!(collection = %collection, key = %key, attempt, "Concurrent update detected, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::Conflict(format!(
            "{}/{} after {} attempts",
            collection, key.id, attempts
        )))
    }

    async fn delete(&self, key: &EntityKey) -> StoreResult<()> {
        self.client
            .delete_existing_document(&Self::collection(key), &key.id)
            .await
    }
}
