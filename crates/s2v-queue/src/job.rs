//! Stage job payloads.
//!
//! Every payload carries the entity id, its parent id and the idempotency
//! tokens the worker must present on its callbacks.

use s2v_models::{
    IdemKey, ImageExtractionBatch, JobKind, Project, SegmentId, StageState, VideoSegment,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// A payload dispatched to one stage's queue.
pub trait StageJob: Serialize + DeserializeOwned {
    const KIND: JobKind;

    fn encode(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(payload: &[u8]) -> QueueResult<Self> {
        serde_json::from_slice(payload).map_err(QueueError::from)
    }
}

fn tokens(stage: &StageState) -> QueueResult<(IdemKey, IdemKey)> {
    match (&stage.running_token, &stage.complete_token) {
        (Some(running), Some(complete)) => Ok((running.clone(), complete.clone())),
        _ => Err(QueueError::enqueue_failed(
            "entity has no live idempotency tokens to dispatch",
        )),
    }
}

/// Rasterize a document into page images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfSplitJob {
    /// Image extraction batch id
    pub id: String,
    /// Project id
    pub parent_id: String,
    pub source_document: String,
    pub idem_key_running: IdemKey,
    pub idem_key_complete_rec: IdemKey,
}

impl PdfSplitJob {
    pub fn for_batch(batch: &ImageExtractionBatch) -> QueueResult<Self> {
        let (running, complete) = tokens(&batch.stage)?;
        Ok(Self {
            id: batch.id.to_string(),
            parent_id: batch.project_id.to_string(),
            source_document: batch.source_document.clone(),
            idem_key_running: running,
            idem_key_complete_rec: complete,
        })
    }
}

impl StageJob for PdfSplitJob {
    const KIND: JobKind = JobKind::PdfSplit;
}

/// Render the narrated video of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRenderJob {
    /// Video segment id
    pub id: String,
    /// Project id
    pub parent_id: String,
    pub image_id: String,
    pub order: u32,
    pub script: String,
    pub idem_key_running: IdemKey,
    pub idem_key_complete_rec: IdemKey,
}

impl SegmentRenderJob {
    pub fn for_segment(segment: &VideoSegment) -> QueueResult<Self> {
        let (running, complete) = tokens(&segment.stage)?;
        Ok(Self {
            id: segment.id.to_string(),
            parent_id: segment.project_id.to_string(),
            image_id: segment.image_id.clone(),
            order: segment.order,
            script: segment.script.clone(),
            idem_key_running: running,
            idem_key_complete_rec: complete,
        })
    }
}

impl StageJob for SegmentRenderJob {
    const KIND: JobKind = JobKind::SegmentRender;
}

/// Concatenate rendered segments into the project output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatJob {
    /// Project id
    pub id: String,
    /// Owner of the project; projects are root entities so this is empty
    #[serde(default)]
    pub parent_id: String,
    /// Segment ids in page order
    pub video_segments: Vec<SegmentId>,
    /// Rendered video ids, aligned with `video_segments`
    pub video_outputs: Vec<String>,
    pub idem_key_running: IdemKey,
    pub idem_key_complete_rec: IdemKey,
}

impl ConcatJob {
    pub fn for_project(
        project: &Project,
        video_segments: Vec<SegmentId>,
        video_outputs: Vec<String>,
    ) -> QueueResult<Self> {
        let (running, complete) = tokens(&project.stage)?;
        Ok(Self {
            id: project.id.to_string(),
            parent_id: String::new(),
            video_segments,
            video_outputs,
            idem_key_running: running,
            idem_key_complete_rec: complete,
        })
    }
}

impl StageJob for ConcatJob {
    const KIND: JobKind = JobKind::Concat;
}
