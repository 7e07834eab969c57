//! Stage status shared by every stage entity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a project, extraction batch or video segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Entity persisted, no worker has picked it up yet
    #[default]
    Created,
    /// A worker reported it is processing the entity
    Running,
    /// Work finished and its output is attached
    Completed,
    /// Work failed
    Error,
}

impl StageStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Created => "created",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Error)
    }

    /// Check whether moving from `self` to `next` is a forward transition.
    ///
    /// `Running -> Running` is accepted so that a re-delivered or re-entered
    /// running report is not an error. `Created -> Error` covers workers that
    /// fail before reporting running.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Error)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Error)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(StageStatus::Created),
            "running" => Ok(StageStatus::Running),
            "completed" => Ok(StageStatus::Completed),
            "error" => Ok(StageStatus::Error),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StageStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Created.can_transition_to(Running));
        assert!(Created.can_transition_to(Error));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Created.can_transition_to(Completed));
        assert!(!Created.can_transition_to(Created));
        assert!(!Running.can_transition_to(Created));
        for terminal in [Completed, Error] {
            for next in [Created, Running, Completed, Error] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for status in [Created, Running, Completed, Error] {
            assert_eq!(status.as_str().parse::<StageStatus>().unwrap(), status);
        }
        assert!("done".parse::<StageStatus>().is_err());
    }

    #[test]
    fn test_terminal() {
        assert!(!Created.is_terminal());
        assert!(!Running.is_terminal());
        assert!(Completed.is_terminal());
        assert!(Error.is_terminal());
    }
}
