//! Project entity: owns the overall pipeline lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, ProjectId, SegmentId};
use crate::status::StageStatus;
use crate::transition::{StageState, Transition, TransitionError, TransitionResult, Transitionable};

/// Reference from a project to one of its video segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentRef {
    pub segment_id: SegmentId,
    /// Page order, assigned at extraction completion and never renumbered
    pub order: u32,
}

/// A document-to-video project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: ProjectId,

    /// Location of the source document (e.g. a storage object name)
    pub source_document: String,

    #[serde(flatten)]
    pub stage: StageState,

    /// The 1:1 image extraction batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_batch_id: Option<BatchId>,

    /// Segments in page order
    #[serde(default)]
    pub segments: Vec<SegmentRef>,

    /// Final concatenated video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_output_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project in `created` with fresh tokens.
    pub fn new(source_document: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            source_document: source_document.into(),
            stage: StageState::fresh(),
            extraction_batch_id: None,
            segments: Vec::new(),
            video_output_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_extraction_batch(mut self, batch_id: BatchId) -> Self {
        self.extraction_batch_id = Some(batch_id);
        self
    }

    pub fn status(&self) -> StageStatus {
        self.stage.status
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.status.is_terminal()
    }

    /// Segment ids in page order.
    pub fn ordered_segment_ids(&self) -> Vec<SegmentId> {
        let mut refs = self.segments.clone();
        refs.sort_by_key(|r| r.order);
        refs.into_iter().map(|r| r.segment_id).collect()
    }
}

impl Transitionable for Project {
    const KIND: &'static str = "project";

    fn apply_transition(&mut self, command: &Transition) -> TransitionResult<()> {
        if let Some(result) = self.stage.apply_common(command) {
            return result;
        }
        match command {
            Transition::AttachSegments(refs) => {
                if refs.is_empty() {
                    return Err(TransitionError::validation("empty segment list"));
                }
                let mut refs = refs.clone();
                refs.sort_by_key(|r| r.order);
                self.segments = refs;
                Ok(())
            }
            Transition::AttachVideoOutput(output) => {
                if !output.ends_with(".mp4") {
                    return Err(TransitionError::validation(format!(
                        "project output must be an .mp4, got {:?}",
                        output
                    )));
                }
                self.video_output_id = Some(output.clone());
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

    fn refs() -> Vec<SegmentRef> {
        vec![
            SegmentRef { segment_id: SegmentId::from_string("b"), order: 2 },
            SegmentRef { segment_id: SegmentId::from_string("a"), order: 1 },
        ]
    }

    #[test]
    fn test_fan_out_plan() {
        let mut project = Project::new("deck.pdf");
        let old_key = project.stage.running_token.clone();

        TransitionPlan::new()
            .then(Transition::AttachSegments(refs()))
            .then(Transition::RegenerateTokens)
            .then(Transition::SetStatus(StageStatus::Running))
            .apply(&mut project)
            .unwrap();

        assert_eq!(project.status(), StageStatus::Running);
        assert_ne!(project.stage.running_token, old_key);
        assert_eq!(
            project.ordered_segment_ids(),
            vec![SegmentId::from_string("a"), SegmentId::from_string("b")]
        );
    }

    #[test]
    fn test_empty_segment_list_aborts_plan() {
        let mut project = Project::new("deck.pdf");
        let before = project.clone();

        let err = TransitionPlan::new()
            .then(Transition::SetStatus(StageStatus::Running))
            .then(Transition::AttachSegments(vec![]))
            .apply(&mut project)
            .unwrap_err();

        assert!(matches!(err, TransitionError::Validation(_)));
        assert_eq!(project, before);
    }

    #[test]
    fn test_output_must_be_mp4() {
        let mut project = Project::new("deck.pdf");
        assert!(project
            .apply_transition(&Transition::AttachVideoOutput("out.mov".into()))
            .is_err());
        project
            .apply_transition(&Transition::AttachVideoOutput("out.mp4".into()))
            .unwrap();
        assert_eq!(project.video_output_id.as_deref(), Some("out.mp4"));
    }

    #[test]
    fn test_segment_commands_unsupported() {
        let mut project = Project::new("deck.pdf");
        assert!(matches!(
            project.apply_transition(&Transition::SetHidden(true)),
            Err(TransitionError::Validation(_))
        ));
    }

    #[test]
    fn test_serde_flattens_stage() {
        let project = Project::new("deck.pdf");
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["status"], "created");
        assert!(json["running_token"].is_string());
        let back: Project = serde_json::from_value(json).unwrap();
        assert_eq!(back, project);
    }
}
