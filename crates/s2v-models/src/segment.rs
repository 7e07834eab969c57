//! Video segment: one rendered clip per page.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, SegmentId};
use crate::status::StageStatus;
use crate::transition::{StageState, Transition, TransitionError, TransitionResult, Transitionable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSegment {
    pub id: SegmentId,
    pub project_id: ProjectId,

    /// Page order
    pub order: u32,
    pub image_id: String,

    /// Narration text, user-editable
    #[serde(default)]
    pub script: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_output_id: Option<String>,

    /// Hidden segments are rendered but left out of the final video
    #[serde(default)]
    pub hidden: bool,

    #[serde(flatten)]
    pub stage: StageState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoSegment {
    pub fn new(project_id: ProjectId, image_id: impl Into<String>, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: SegmentId::new(),
            project_id,
            order,
            image_id: image_id.into(),
            script: String::new(),
            video_output_id: None,
            hidden: false,
            stage: StageState::fresh(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> StageStatus {
        self.stage.status
    }

    pub fn is_completed(&self) -> bool {
        self.stage.status == StageStatus::Completed
    }
}

impl Transitionable for VideoSegment {
    const KIND: &'static str = "video segment";

    fn apply_transition(&mut self, command: &Transition) -> TransitionResult<()> {
        if let Some(result) = self.stage.apply_common(command) {
            return result;
        }
        match command {
            Transition::AttachVideoOutput(output) => {
                if output.trim().is_empty() {
                    return Err(TransitionError::validation("empty video output id"));
                }
                self.video_output_id = Some(output.clone());
                Ok(())
            }
            Transition::SetScript(script) => {
                self.script = script.clone();
                Ok(())
            }
            Transition::SetHidden(hidden) => {
                self.hidden = *hidden;
                Ok(())
            }
            other => Err(Self::unsupported(other)),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TransitionPlan;

    fn segment() -> VideoSegment {
        VideoSegment::new(ProjectId::from_string("p"), "img-1", 1)
    }

    #[test]
    fn test_render_callbacks() {
        let mut seg = segment();
        let running = seg.stage.running_token.clone().unwrap();
        let complete = seg.stage.complete_token.clone().unwrap();

        TransitionPlan::new()
            .then(Transition::ClearRunningToken(running))
            .then(Transition::SetStatus(StageStatus::Running))
            .apply(&mut seg)
            .unwrap();

        TransitionPlan::new()
            .then(Transition::ClearCompleteToken(complete.clone()))
            .then(Transition::SetStatus(StageStatus::Completed))
            .then(Transition::AttachVideoOutput("v1".into()))
            .apply(&mut seg)
            .unwrap();

        assert!(seg.is_completed());
        assert_eq!(seg.video_output_id.as_deref(), Some("v1"));

        // Replay with the consumed token changes nothing.
        let before = seg.clone();
        let err = TransitionPlan::new()
            .then(Transition::ClearCompleteToken(complete))
            .then(Transition::SetStatus(StageStatus::Completed))
            .then(Transition::AttachVideoOutput("v1-again".into()))
            .apply(&mut seg)
            .unwrap_err();
        assert!(err.is_stale_token());
        assert_eq!(seg, before);
    }

    #[test]
    fn test_skip_to_completed_rejected() {
        let mut seg = segment();
        let complete = seg.stage.complete_token.clone().unwrap();
        let err = TransitionPlan::new()
            .then(Transition::ClearCompleteToken(complete))
            .then(Transition::SetStatus(StageStatus::Completed))
            .apply(&mut seg)
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
        assert!(seg.stage.complete_token.is_some());
    }

    #[test]
    fn test_edits_allowed_after_completion() {
        let mut seg = segment();
        seg.stage.status = StageStatus::Completed;
        TransitionPlan::new()
            .then(Transition::SetScript("hello".into()))
            .then(Transition::SetHidden(true))
            .apply(&mut seg)
            .unwrap();
        assert_eq!(seg.script, "hello");
        assert!(seg.hidden);
        assert_eq!(seg.status(), StageStatus::Completed);
    }
}
