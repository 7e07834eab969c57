//! Store and queue bundles shared by the dispatcher, gateway and reconciler.

use std::sync::Arc;

use s2v_models::{ImageExtractionBatch, JobKind, Project, VideoSegment, WatcherTask};
use s2v_queue::{MemoryQueue, QueueBackend, QueueConfig, QueuePort, QueueResult, RedisStreamQueue};
use s2v_store::{EntityStore, FirestoreClient, FirestoreStore, MemoryStore};
use tracing::info;

/// One store per entity collection.
#[derive(Clone)]
pub struct PipelineStores {
    pub projects: Arc<dyn EntityStore<Project>>,
    pub batches: Arc<dyn EntityStore<ImageExtractionBatch>>,
    pub segments: Arc<dyn EntityStore<VideoSegment>>,
    pub watchers: Arc<dyn EntityStore<WatcherTask>>,
}

impl PipelineStores {
    pub fn in_memory() -> Self {
        Self {
            projects: Arc::new(MemoryStore::<Project>::new()),
            batches: Arc::new(MemoryStore::<ImageExtractionBatch>::new()),
            segments: Arc::new(MemoryStore::<VideoSegment>::new()),
            watchers: Arc::new(MemoryStore::<WatcherTask>::new()),
        }
    }

    pub fn firestore(client: FirestoreClient) -> Self {
        Self {
            projects: Arc::new(FirestoreStore::<Project>::new(client.clone())),
            batches: Arc::new(FirestoreStore::<ImageExtractionBatch>::new(client.clone())),
            segments: Arc::new(FirestoreStore::<VideoSegment>::new(client.clone())),
            watchers: Arc::new(FirestoreStore::<WatcherTask>::new(client)),
        }
    }
}

/// One queue per stage.
#[derive(Clone)]
pub struct StageQueues {
    pub pdf_split: Arc<dyn QueuePort>,
    pub segment_render: Arc<dyn QueuePort>,
    pub concat: Arc<dyn QueuePort>,
}

impl StageQueues {
    pub fn in_memory() -> Self {
        Self {
            pdf_split: Arc::new(MemoryQueue::new(JobKind::PdfSplit.as_str())),
            segment_render: Arc::new(MemoryQueue::new(JobKind::SegmentRender.as_str())),
            concat: Arc::new(MemoryQueue::new(JobKind::Concat.as_str())),
        }
    }

    /// Build the queues for the configured backend, creating Redis consumer
    /// groups up front.
    pub async fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        match config.backend {
            QueueBackend::Memory => Ok(Self::in_memory()),
            QueueBackend::Redis => Ok(Self {
                pdf_split: redis_queue(config, JobKind::PdfSplit).await?,
                segment_render: redis_queue(config, JobKind::SegmentRender).await?,
                concat: redis_queue(config, JobKind::Concat).await?,
            }),
        }
    }

    pub fn for_kind(&self, kind: JobKind) -> &Arc<dyn QueuePort> {
        match kind {
            JobKind::PdfSplit => &self.pdf_split,
            JobKind::SegmentRender => &self.segment_render,
            JobKind::Concat => &self.concat,
        }
    }
}

async fn redis_queue(config: &QueueConfig, kind: JobKind) -> QueueResult<Arc<dyn QueuePort>> {
    let queue = RedisStreamQueue::new(config.clone(), kind)?;
    queue.init().await?;
    info!(stream = %queue.stream_name(), "Stage queue ready");
    Ok(Arc::new(queue))
}
