//! Entity keys and per-entity persistence metadata.

use std::fmt;

use s2v_models::{ImageExtractionBatch, Project, Transitionable, VideoSegment, WatcherTask};
use serde::{de::DeserializeOwned, Serialize};

/// Primary key of a stored entity: optional parent id plus entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub parent: Option<String>,
    pub id: String,
}

impl EntityKey {
    /// Key of a root entity.
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            parent: None,
            id: id.into(),
        }
    }

    /// Key of an entity owned by `parent`.
    pub fn child(parent: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}/{}", parent, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A persistable stage entity.
pub trait Entity: Transitionable + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name of this entity.
    const COLLECTION: &'static str;

    /// Collection holding the parent entity, for owned entities.
    const PARENT_COLLECTION: Option<&'static str> = None;

    fn key(&self) -> EntityKey;
}

impl Entity for Project {
    const COLLECTION: &'static str = "projects";

    fn key(&self) -> EntityKey {
        EntityKey::root(self.id.as_str())
    }
}

impl Entity for ImageExtractionBatch {
    const COLLECTION: &'static str = "extraction_batches";
    const PARENT_COLLECTION: Option<&'static str> = Some("projects");

    fn key(&self) -> EntityKey {
        EntityKey::child(self.project_id.as_str(), self.id.as_str())
    }
}

impl Entity for VideoSegment {
    const COLLECTION: &'static str = "video_segments";
    const PARENT_COLLECTION: Option<&'static str> = Some("projects");

    fn key(&self) -> EntityKey {
        EntityKey::child(self.project_id.as_str(), self.id.as_str())
    }
}

impl Entity for WatcherTask {
    const COLLECTION: &'static str = "watchers";

    fn key(&self) -> EntityKey {
        EntityKey::root(self.id.as_str())
    }
}

/// Collection path of `T` under an optional parent, e.g. `projects/p1/video_segments`.
pub fn collection_path<T: Entity>(parent: Option<&str>) -> String {
    match (T::PARENT_COLLECTION, parent) {
        (Some(parent_collection), Some(parent)) => {
            format!("{}/{}/{}", parent_collection, parent, T::COLLECTION)
        }
        _ => T::COLLECTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2v_models::ProjectId;

    #[test]
    fn test_key_display() {
        assert_eq!(EntityKey::root("p1").to_string(), "p1");
        assert_eq!(EntityKey::child("p1", "s1").to_string(), "p1/s1");
    }

    #[test]
    fn test_collection_paths() {
        assert_eq!(collection_path::<Project>(None), "projects");
        assert_eq!(
            collection_path::<VideoSegment>(Some("p1")),
            "projects/p1/video_segments"
        );
        assert_eq!(collection_path::<WatcherTask>(None), "watchers");
    }

    #[test]
    fn test_segment_key_uses_project() {
        let seg = VideoSegment::new(ProjectId::from_string("p1"), "img", 1);
        assert_eq!(seg.key().parent.as_deref(), Some("p1"));
        assert_eq!(seg.key().id, seg.id.as_str());
    }
}
