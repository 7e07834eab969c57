//! Stage dispatcher.
//!
//! Creates child work items when a stage is entered, persists them and
//! enqueues one job per child. Enqueue failures abort the current request;
//! entities already created are left in place.

use s2v_models::{
    ImageExtractionBatch, JobKind, Project, ProjectId, SegmentId, SegmentRef, StageStatus,
    Transition, TransitionPlan, VideoSegment, WatcherTask,
};
use s2v_queue::{ConcatJob, PdfSplitJob, SegmentRenderJob, StageJob};
use s2v_store::EntityKey;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::context::{PipelineStores, StageQueues};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::metrics;

/// One entry of the concat list: a segment and its rendered video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatInput {
    pub segment_id: SegmentId,
    pub video_output_id: String,
}

/// User edit of a segment. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentEdit {
    pub script: Option<String>,
    pub hidden: Option<bool>,
}

pub struct Dispatcher {
    stores: PipelineStores,
    queues: StageQueues,
    watcher_ttl: chrono::Duration,
}

impl Dispatcher {
    pub fn new(stores: PipelineStores, queues: StageQueues, config: &PipelineConfig) -> Self {
        Self {
            stores,
            queues,
            watcher_ttl: config.watcher_ttl(),
        }
    }

    pub fn stores(&self) -> &PipelineStores {
        &self.stores
    }

    async fn enqueue<J: StageJob>(&self, job: &J) -> PipelineResult<String> {
        let payload = job.encode()?;
        let result = self.queues.for_kind(J::KIND).enqueue(payload).await;
        metrics::record_dispatch(J::KIND.as_str(), result.is_ok());
        Ok(result?)
    }

    /// Create a project with its extraction batch and enqueue the PDF split job.
    pub async fn submit_project(&self, source_document: &str) -> PipelineResult<Project> {
        let source_document = source_document.trim();
        if source_document.is_empty() {
            return Err(PipelineError::validation("source document is required"));
        }

        let project = Project::new(source_document);
        let batch = ImageExtractionBatch::new(project.id.clone(), source_document);
        let project = project.with_extraction_batch(batch.id.clone());

        let project = self.stores.projects.create(project).await?;
        let batch = self.stores.batches.create(batch).await?;

        let logger = StageLogger::new(JobKind::PdfSplit, batch.id.as_str());
        let job = PdfSplitJob::for_batch(&batch)?;
        let message_id = self.enqueue(&job).await.inspect_err(|e| {
            logger.log_error(&format!("enqueue failed for project {}: {}", project.id, e));
        })?;

        logger.log_start(&format!(
            "project {} submitted, message {}",
            project.id, message_id
        ));
        Ok(project)
    }

    /// Fan out a completed extraction batch into one render job per page.
    ///
    /// Segments are created first, then the project is moved to running with
    /// the segment list and fresh tokens, then the fan-in watcher is created,
    /// then render jobs are enqueued.
    pub async fn on_extraction_completed(
        &self,
        batch: &ImageExtractionBatch,
    ) -> PipelineResult<Vec<VideoSegment>> {
        if batch.status() != StageStatus::Completed {
            return Err(PipelineError::validation(format!(
                "batch {} is {}, not completed",
                batch.id,
                batch.status()
            )));
        }
        if batch.pages.is_empty() {
            return Err(PipelineError::validation(format!(
                "batch {} produced no pages",
                batch.id
            )));
        }

        let logger = StageLogger::new(JobKind::SegmentRender, batch.project_id.as_str());
        logger.log_start(&format!("fanning out {} pages", batch.pages.len()));

        let mut segments = Vec::with_capacity(batch.pages.len());
        for page in &batch.pages {
            let segment = VideoSegment::new(batch.project_id.clone(), &page.image_id, page.order);
            segments.push(self.stores.segments.create(segment).await?);
        }

        let refs = segments
            .iter()
            .map(|s| SegmentRef {
                segment_id: s.id.clone(),
                order: s.order,
            })
            .collect();
        let plan = TransitionPlan::new()
            .then(Transition::AttachSegments(refs))
            .then(Transition::RegenerateTokens)
            .then(Transition::SetStatus(StageStatus::Running));
        self.stores
            .projects
            .update(&EntityKey::root(batch.project_id.as_str()), &plan)
            .await?;

        let watcher = WatcherTask::trigger_concat(batch.project_id.clone(), self.watcher_ttl);
        if let Err(e) = self.stores.watchers.create(watcher).await {
            if e.is_already_exists() {
                logger.log_warning("concat watcher already exists");
            } else {
                return Err(e.into());
            }
        }

        for segment in &segments {
            let job = SegmentRenderJob::for_segment(segment)?;
            self.enqueue(&job).await.inspect_err(|e| {
                logger.log_error(&format!("enqueue failed for segment {}: {}", segment.id, e));
            })?;
        }

        logger.log_progress(&format!("{} render jobs enqueued", segments.len()));
        Ok(segments)
    }

    /// Propagate a failed extraction to the owning project.
    pub async fn on_extraction_failed(&self, project_id: &ProjectId) -> PipelineResult<Project> {
        let plan = TransitionPlan::new().then(Transition::SetStatus(StageStatus::Error));
        let project = self
            .stores
            .projects
            .update(&EntityKey::root(project_id.as_str()), &plan)
            .await?;
        warn!(project_id = %project_id, "Extraction failed, project marked as error");
        Ok(project)
    }

    /// Re-enqueue a segment that never started rendering.
    pub async fn redispatch_segment(
        &self,
        project_id: &ProjectId,
        segment_id: &SegmentId,
    ) -> PipelineResult<VideoSegment> {
        let key = EntityKey::child(project_id.as_str(), segment_id.as_str());
        let segment = self.stores.segments.get(&key).await?;
        if segment.status() != StageStatus::Created {
            return Err(PipelineError::validation(format!(
                "segment {} is {}, only created segments can be re-dispatched",
                segment_id,
                segment.status()
            )));
        }

        let plan = TransitionPlan::new().then(Transition::RegenerateTokens);
        let segment = self.stores.segments.update(&key, &plan).await?;
        let job = SegmentRenderJob::for_segment(&segment)?;
        let message_id = self.enqueue(&job).await?;

        info!(
            project_id = %project_id,
            segment_id = %segment_id,
            message_id = %message_id,
            "Segment re-dispatched"
        );
        Ok(segment)
    }

    /// Enqueue the concat job for a project.
    ///
    /// The job carries the project's current tokens, so a duplicate trigger
    /// produces a job whose completion the project guard absorbs. Returns
    /// `None` without enqueueing once the concat worker has consumed the
    /// running token: the stage was already fired.
    pub async fn trigger_concat(
        &self,
        project_id: &ProjectId,
        inputs: Vec<ConcatInput>,
    ) -> PipelineResult<Option<String>> {
        if inputs.is_empty() {
            return Err(PipelineError::validation("concat list is empty"));
        }

        let project = self
            .stores
            .projects
            .get(&EntityKey::root(project_id.as_str()))
            .await?;
        if project.is_terminal() {
            return Err(PipelineError::validation(format!(
                "project {} is already {}",
                project_id,
                project.status()
            )));
        }
        if project.stage.running_token.is_none() {
            debug!(project_id = %project_id, "Concat already started, skipping enqueue");
            return Ok(None);
        }

        let (segment_ids, outputs) = inputs
            .into_iter()
            .map(|i| (i.segment_id, i.video_output_id))
            .unzip();
        let job = ConcatJob::for_project(&project, segment_ids, outputs)?;
        let message_id = self.enqueue(&job).await?;

        StageLogger::new(JobKind::Concat, project_id.as_str())
            .log_start(&format!("concat enqueued, message {}", message_id));
        Ok(Some(message_id))
    }

    /// Apply a user edit to a segment's script or visibility.
    pub async fn edit_segment(
        &self,
        project_id: &ProjectId,
        segment_id: &SegmentId,
        edit: SegmentEdit,
    ) -> PipelineResult<VideoSegment> {
        let plan = TransitionPlan::new()
            .then_some(edit.script.map(Transition::SetScript))
            .then_some(edit.hidden.map(Transition::SetHidden));
        if plan.is_empty() {
            return Err(PipelineError::validation("edit changes nothing"));
        }

        let key = EntityKey::child(project_id.as_str(), segment_id.as_str());
        Ok(self.stores.segments.update(&key, &plan).await?)
    }

    /// Ordered segments of a project.
    pub async fn list_segments(&self, project_id: &ProjectId) -> PipelineResult<Vec<VideoSegment>> {
        let mut segments = self
            .stores
            .segments
            .list(Some(project_id.as_str()), None)
            .await?;
        segments.sort_by_key(|s| s.order);
        Ok(segments)
    }
}
