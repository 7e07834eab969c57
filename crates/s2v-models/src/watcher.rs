//! Reconciliation watcher tasks.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, WatcherId};
use crate::transition::{Transition, TransitionResult, Transitionable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WatcherKind {
    /// Fire the concat job once every segment of the project is completed
    TriggerConcat,
}

impl WatcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherKind::TriggerConcat => "trigger_concat",
        }
    }
}

/// Ephemeral fan-in wait. Deleted once it fires or expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WatcherTask {
    pub id: WatcherId,
    pub project_id: ProjectId,
    pub kind: WatcherKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WatcherTask {
    /// Concat watcher for a project, expiring after `ttl`.
    pub fn trigger_concat(project_id: ProjectId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: WatcherId::for_concat(&project_id),
            project_id,
            kind: WatcherKind::TriggerConcat,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl Transitionable for WatcherTask {
    const KIND: &'static str = "watcher task";

    fn apply_transition(&mut self, command: &Transition) -> TransitionResult<()> {
        Err(Self::unsupported(command))
    }

    fn touch(&mut self, _now: DateTime<Utc>) {}
}
