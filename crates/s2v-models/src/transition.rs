//! Named transition commands and the idempotency guard.
//!
//! Every state change of a stage entity is expressed as a [`TransitionPlan`]:
//! an ordered list of [`Transition`] commands applied to a draft copy of the
//! entity. The draft replaces the original only if every command succeeds, so
//! a failing command (stale token, validation, backward status) leaves the
//! entity untouched.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::PageImage;
use crate::ids::IdemKey;
use crate::project::SegmentRef;
use crate::status::StageStatus;

/// Errors raised while applying a transition plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Presented token does not match the stored one (already handled).
    #[error("stale {0} token")]
    StaleToken(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: StageStatus, to: StageStatus },
}

impl TransitionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if this error means the callback was already handled.
    pub fn is_stale_token(&self) -> bool {
        matches!(self, Self::StaleToken(_))
    }
}

pub type TransitionResult<T> = Result<T, TransitionError>;

/// A single named state-change command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Guard: consume the running token.
    ClearRunningToken(IdemKey),
    /// Guard: consume the complete token.
    ClearCompleteToken(IdemKey),
    /// Consume the running token and move to running, but only while the
    /// entity is still `created`. No-op otherwise.
    EnterRunning(IdemKey),
    /// Move to a new status, validated against the forward-only rules.
    SetStatus(StageStatus),
    /// Mint a fresh pair of tokens. Refused on terminal entities.
    RegenerateTokens,
    /// Attach the pages produced by image extraction.
    AttachPages(Vec<PageImage>),
    /// Attach a rendered video output identifier.
    AttachVideoOutput(String),
    /// Attach the ordered segment references of a project.
    AttachSegments(Vec<SegmentRef>),
    SetScript(String),
    SetHidden(bool),
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::ClearRunningToken(_) => "clear_running_token",
            Transition::ClearCompleteToken(_) => "clear_complete_token",
            Transition::EnterRunning(_) => "enter_running",
            Transition::SetStatus(_) => "set_status",
            Transition::RegenerateTokens => "regenerate_tokens",
            Transition::AttachPages(_) => "attach_pages",
            Transition::AttachVideoOutput(_) => "attach_video_output",
            Transition::AttachSegments(_) => "attach_segments",
            Transition::SetScript(_) => "set_script",
            Transition::SetHidden(_) => "set_hidden",
        }
    }
}

/// Ordered list of transition commands applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    commands: Vec<Transition>,
}

impl TransitionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn then(mut self, command: Transition) -> Self {
        self.commands.push(command);
        self
    }

    /// Append a command only when `command` is `Some`.
    pub fn then_some(mut self, command: Option<Transition>) -> Self {
        if let Some(command) = command {
            self.commands.push(command);
        }
        self
    }

    pub fn push(&mut self, command: Transition) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Transition] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command names, for logging.
    pub fn describe(&self) -> Vec<&'static str> {
        self.commands.iter().map(Transition::name).collect()
    }

    /// Apply every command to a draft of `entity`, committing only on success.
    pub fn apply<T: Transitionable>(&self, entity: &mut T) -> TransitionResult<()> {
        let mut draft = entity.clone();
        for command in &self.commands {
            draft.apply_transition(command)?;
        }
        draft.touch(Utc::now());
        *entity = draft;
        Ok(())
    }
}

impl From<Vec<Transition>> for TransitionPlan {
    fn from(commands: Vec<Transition>) -> Self {
        Self { commands }
    }
}

/// An entity that accepts transition commands.
pub trait Transitionable: Clone {
    /// Entity name used in error messages.
    const KIND: &'static str;

    fn apply_transition(&mut self, command: &Transition) -> TransitionResult<()>;

    fn touch(&mut self, now: DateTime<Utc>);

    fn unsupported(command: &Transition) -> TransitionError {
        TransitionError::Validation(format!(
            "{} does not support {}",
            Self::KIND,
            command.name()
        ))
    }
}

/// Status and idempotency tokens shared by every stage entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageState {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_token: Option<IdemKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_token: Option<IdemKey>,
}

impl StageState {
    /// New `created` state with freshly minted tokens.
    pub fn fresh() -> Self {
        Self {
            status: StageStatus::Created,
            running_token: Some(IdemKey::mint()),
            complete_token: Some(IdemKey::mint()),
        }
    }

    pub fn clear_running(&mut self, presented: &IdemKey) -> TransitionResult<()> {
        consume(&mut self.running_token, presented, "running")
    }

    pub fn clear_complete(&mut self, presented: &IdemKey) -> TransitionResult<()> {
        consume(&mut self.complete_token, presented, "complete")
    }

    pub fn set_status(&mut self, next: StageStatus) -> TransitionResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn regenerate(&mut self) -> TransitionResult<()> {
        if self.status.is_terminal() {
            return Err(TransitionError::validation(format!(
                "cannot regenerate tokens in terminal status {}",
                self.status
            )));
        }
        self.running_token = Some(IdemKey::mint());
        self.complete_token = Some(IdemKey::mint());
        Ok(())
    }

    /// Apply the commands every stage entity understands.
    ///
    /// Returns `None` when the command is entity-specific.
    pub fn apply_common(&mut self, command: &Transition) -> Option<TransitionResult<()>> {
        let result = match command {
            Transition::ClearRunningToken(key) => self.clear_running(key),
            Transition::ClearCompleteToken(key) => self.clear_complete(key),
            Transition::EnterRunning(key) => {
                if self.status == StageStatus::Created {
                    self.clear_running(key)
                        .and_then(|_| self.set_status(StageStatus::Running))
                } else {
                    Ok(())
                }
            }
            Transition::SetStatus(next) => self.set_status(*next),
            Transition::RegenerateTokens => self.regenerate(),
            _ => return None,
        };
        Some(result)
    }
}

impl Default for StageState {
    fn default() -> Self {
        Self::fresh()
    }
}

fn consume(
    slot: &mut Option<IdemKey>,
    presented: &IdemKey,
    which: &'static str,
) -> TransitionResult<()> {
    match slot {
        Some(stored) if stored == presented => {
            *slot = None;
            Ok(())
        }
        _ => Err(TransitionError::StaleToken(which)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_running_consumes_token_once() {
        let mut state = StageState::fresh();
        let key = state.running_token.clone().unwrap();

        assert!(state.clear_running(&key).is_ok());
        assert!(state.running_token.is_none());
        assert_eq!(
            state.clear_running(&key),
            Err(TransitionError::StaleToken("running"))
        );
    }

    #[test]
    fn test_mismatched_token_leaves_state() {
        let mut state = StageState::fresh();
        let before = state.clone();

        let err = state.clear_complete(&IdemKey::mint()).unwrap_err();
        assert!(err.is_stale_token());
        assert_eq!(state, before);
    }

    #[test]
    fn test_enter_running_only_from_created() {
        let mut state = StageState::fresh();
        let key = state.running_token.clone().unwrap();

        state
            .apply_common(&Transition::EnterRunning(key.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(state.status, StageStatus::Running);

        // Already running: no-op, even with the now-cleared token.
        state
            .apply_common(&Transition::EnterRunning(key))
            .unwrap()
            .unwrap();
        assert_eq!(state.status, StageStatus::Running);
    }

    #[test]
    fn test_regenerate_refused_when_terminal() {
        let mut state = StageState::fresh();
        let old = state.running_token.clone();
        state.regenerate().unwrap();
        assert_ne!(state.running_token, old);

        state.status = StageStatus::Completed;
        assert!(matches!(
            state.regenerate(),
            Err(TransitionError::Validation(_))
        ));
    }

    #[test]
    fn test_entity_specific_commands_not_common() {
        let mut state = StageState::fresh();
        assert!(state.apply_common(&Transition::SetHidden(true)).is_none());
    }
}
