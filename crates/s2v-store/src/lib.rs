//! Transactional entity store for pipeline entities.
//!
//! This crate provides:
//! - The `EntityStore` contract (create/get/list/update/delete)
//! - An in-memory backend with per-collection locking
//! - A Firestore REST backend with optimistic-concurrency updates
//! - Service account authentication via gcp_auth, token caching and retries

pub mod entity;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod store;

pub use entity::{collection_path, Entity, EntityKey};
pub use error::{StoreError, StoreResult};
pub use firestore::{FirestoreClient, FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;
pub use store::EntityStore;

/// Which persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Firestore,
}

impl StoreBackend {
    /// Read `STORE_BACKEND` (`memory` or `firestore`).
    pub fn from_env() -> Self {
        match std::env::var("STORE_BACKEND")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            _ => StoreBackend::Memory,
        }
    }
}
