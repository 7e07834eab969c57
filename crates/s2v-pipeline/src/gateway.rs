//! Status update gateway.
//!
//! Single entry point for worker callbacks. A callback is turned into a
//! transition plan (token guard, status change, payload) and applied to the
//! entity of the reporting stage. Replays rejected by the token guard are
//! reported as handled.

use std::sync::Arc;

use s2v_models::{IdemKey, JobKind, PageImage, ProjectId, StageStatus, Transition, TransitionPlan};
use s2v_store::EntityKey;
use tracing::{debug, info, Instrument};

use crate::dispatcher::Dispatcher;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::metrics;

/// A worker's status report for one job.
#[derive(Debug, Clone)]
pub struct StatusCallback {
    pub kind: JobKind,
    pub project_id: ProjectId,
    /// Batch, segment or project id, depending on `kind`
    pub entity_id: String,
    pub status: StageStatus,
    pub running_key: Option<IdemKey>,
    pub complete_key: Option<IdemKey>,
    /// Extraction output
    pub pages: Option<Vec<PageImage>>,
    /// Render or concat output
    pub video_output_id: Option<String>,
}

impl StatusCallback {
    pub fn new(
        kind: JobKind,
        project_id: ProjectId,
        entity_id: impl Into<String>,
        status: StageStatus,
    ) -> Self {
        Self {
            kind,
            project_id,
            entity_id: entity_id.into(),
            status,
            running_key: None,
            complete_key: None,
            pages: None,
            video_output_id: None,
        }
    }

    pub fn with_running_key(mut self, key: IdemKey) -> Self {
        self.running_key = Some(key);
        self
    }

    pub fn with_complete_key(mut self, key: IdemKey) -> Self {
        self.complete_key = Some(key);
        self
    }

    pub fn with_pages(mut self, pages: Vec<PageImage>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_video_output(mut self, id: impl Into<String>) -> Self {
        self.video_output_id = Some(id.into());
        self
    }

    /// Guard, status and payload commands for this report.
    fn plan(&self) -> PipelineResult<TransitionPlan> {
        match self.status {
            StageStatus::Created => Err(PipelineError::validation(
                "workers cannot report created",
            )),
            StageStatus::Running => {
                let key = self.running_key.clone().ok_or_else(|| {
                    PipelineError::validation("idem_key_running is required for running")
                })?;
                Ok(TransitionPlan::new()
                    .then(Transition::ClearRunningToken(key))
                    .then(Transition::SetStatus(StageStatus::Running)))
            }
            StageStatus::Completed | StageStatus::Error => {
                let key = self.complete_key.clone().ok_or_else(|| {
                    PipelineError::validation(format!(
                        "idem_key_complete_rec is required for {}",
                        self.status
                    ))
                })?;
                let plan = TransitionPlan::new()
                    .then_some(self.running_key.clone().map(Transition::EnterRunning))
                    .then(Transition::ClearCompleteToken(key))
                    .then(Transition::SetStatus(self.status));

                if self.status == StageStatus::Error {
                    return Ok(plan);
                }
                Ok(plan.then(self.payload()?))
            }
        }
    }

    fn payload(&self) -> PipelineResult<Transition> {
        match self.kind {
            JobKind::PdfSplit => self
                .pages
                .clone()
                .map(Transition::AttachPages)
                .ok_or_else(|| PipelineError::validation("completed extraction carries no pages")),
            JobKind::SegmentRender | JobKind::Concat => self
                .video_output_id
                .clone()
                .map(Transition::AttachVideoOutput)
                .ok_or_else(|| {
                    PipelineError::validation("completed render carries no video output")
                }),
        }
    }
}

/// Result of a handled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The transition was applied.
    Applied,
    /// The token was already consumed; nothing changed.
    Duplicate,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied => "applied",
            CallbackOutcome::Duplicate => "duplicate",
        }
    }
}

pub struct StatusGateway {
    dispatcher: Arc<Dispatcher>,
}

impl StatusGateway {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Apply a worker callback.
    ///
    /// `StaleToken` is absorbed as `Duplicate`. Every other failure is
    /// returned to the caller with the entity unchanged.
    pub async fn handle(&self, callback: StatusCallback) -> PipelineResult<CallbackOutcome> {
        let logger = StageLogger::new(callback.kind, callback.entity_id.as_str());

        let result = match self.apply(&callback).instrument(logger.create_span()).await {
            Ok(()) => Ok(CallbackOutcome::Applied),
            Err(PipelineError::StaleToken(reason)) => {
                info!(
                    entity_id = %callback.entity_id,
                    status = %callback.status,
                    "Duplicate callback ignored: {}",
                    reason
                );
                Ok(CallbackOutcome::Duplicate)
            }
            Err(e) => {
                logger.log_warning(&format!("callback rejected: {}", e));
                Err(e)
            }
        };

        metrics::record_callback(
            callback.kind.as_str(),
            callback.status.as_str(),
            match &result {
                Ok(outcome) => outcome.as_str(),
                Err(_) => "rejected",
            },
        );
        result
    }

    async fn apply(&self, callback: &StatusCallback) -> PipelineResult<()> {
        let plan = callback.plan()?;
        let stores = self.dispatcher.stores();
        let project_id = &callback.project_id;

        match callback.kind {
            JobKind::PdfSplit => {
                let key = EntityKey::child(project_id.as_str(), callback.entity_id.as_str());
                let batch = stores.batches.update(&key, &plan).await?;
                debug!(batch_id = %batch.id, status = %batch.status(), "Batch updated");

                match batch.status() {
                    StageStatus::Completed => {
                        self.dispatcher.on_extraction_completed(&batch).await?;
                    }
                    StageStatus::Error => {
                        self.dispatcher.on_extraction_failed(project_id).await?;
                    }
                    _ => {}
                }
            }
            JobKind::SegmentRender => {
                let key = EntityKey::child(project_id.as_str(), callback.entity_id.as_str());
                let segment = stores.segments.update(&key, &plan).await?;
                debug!(segment_id = %segment.id, status = %segment.status(), "Segment updated");
            }
            JobKind::Concat => {
                if callback.entity_id != project_id.as_str() {
                    return Err(PipelineError::validation(format!(
                        "concat callback for {} addressed to project {}",
                        callback.entity_id, project_id
                    )));
                }
                if callback.status == StageStatus::Completed {
                    self.ensure_segments_completed(project_id).await?;
                }
                let project = stores
                    .projects
                    .update(&EntityKey::root(project_id.as_str()), &plan)
                    .await?;
                if project.status() == StageStatus::Completed {
                    StageLogger::new(JobKind::Concat, project_id.as_str()).log_completion(
                        &format!(
                            "output {}",
                            project.video_output_id.as_deref().unwrap_or_default()
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    /// A project may only complete once every segment it owns has.
    async fn ensure_segments_completed(&self, project_id: &ProjectId) -> PipelineResult<()> {
        let segments = self.dispatcher.list_segments(project_id).await?;
        if let Some(pending) = segments.iter().find(|s| !s.is_completed()) {
            return Err(PipelineError::consistency(format!(
                "project {} cannot complete: segment {} is {}",
                project_id,
                pending.id,
                pending.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_requires_running_key() {
        let cb = StatusCallback::new(
            JobKind::SegmentRender,
            ProjectId::from_string("p"),
            "s",
            StageStatus::Running,
        )
        .with_complete_key(IdemKey::mint());
        assert!(matches!(cb.plan(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_created_is_not_reportable() {
        let cb = StatusCallback::new(
            JobKind::PdfSplit,
            ProjectId::from_string("p"),
            "b",
            StageStatus::Created,
        );
        assert!(cb.plan().is_err());
    }

    #[test]
    fn test_completed_plan_shape() {
        let cb = StatusCallback::new(
            JobKind::SegmentRender,
            ProjectId::from_string("p"),
            "s",
            StageStatus::Completed,
        )
        .with_running_key(IdemKey::mint())
        .with_complete_key(IdemKey::mint())
        .with_video_output("v1");

        let plan = cb.plan().unwrap();
        assert_eq!(
            plan.describe(),
            vec![
                "enter_running",
                "clear_complete_token",
                "set_status",
                "attach_video_output"
            ]
        );
    }

    #[test]
    fn test_completed_requires_payload() {
        let cb = StatusCallback::new(
            JobKind::PdfSplit,
            ProjectId::from_string("p"),
            "b",
            StageStatus::Completed,
        )
        .with_complete_key(IdemKey::mint());
        assert!(matches!(cb.plan(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_error_plan_skips_payload() {
        let cb = StatusCallback::new(
            JobKind::Concat,
            ProjectId::from_string("p"),
            "p",
            StageStatus::Error,
        )
        .with_complete_key(IdemKey::mint());
        assert_eq!(
            cb.plan().unwrap().describe(),
            vec!["clear_complete_token", "set_status"]
        );
    }
}
