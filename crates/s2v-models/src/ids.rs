//! Identifier newtypes and idempotency tokens.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a project.
    ProjectId
);

entity_id!(
    /// Unique identifier for an image extraction batch.
    BatchId
);

entity_id!(
    /// Unique identifier for a video segment.
    SegmentId
);

entity_id!(
    /// Unique identifier for a reconciliation watcher task.
    WatcherId
);

impl WatcherId {
    /// Watcher id for the concat fan-in of a project.
    ///
    /// Deterministic so that a project never has two concat watchers.
    pub fn for_concat(project_id: &ProjectId) -> Self {
        Self(format!("concat-{}", project_id))
    }
}

/// Single-use idempotency token.
///
/// A fresh value is minted whenever an entity is created or re-enters the
/// running state. Presenting a stale value never matches a newer generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct IdemKey(pub String);

impl IdemKey {
    /// Mint a new random token.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ProjectId::new(), ProjectId::new());
        assert_ne!(IdemKey::mint(), IdemKey::mint());
    }

    #[test]
    fn test_watcher_id_is_deterministic() {
        let project = ProjectId::from_string("p-1");
        assert_eq!(WatcherId::for_concat(&project), WatcherId::for_concat(&project));
        assert_eq!(WatcherId::for_concat(&project).as_str(), "concat-p-1");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = SegmentId::from_string("seg-9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"seg-9\"");
    }
}
