//! Shared data models for the Slides2Video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Stage entities (projects, image extraction batches, video segments)
//! - Reconciliation watcher tasks
//! - The closed stage status enum and its transition rules
//! - Single-use idempotency tokens
//! - Named transition commands applied by the entity store

pub mod batch;
pub mod ids;
pub mod job_kind;
pub mod project;
pub mod segment;
pub mod status;
pub mod transition;
pub mod watcher;

// Re-export common types
pub use batch::{ImageExtractionBatch, PageImage};
pub use ids::{BatchId, IdemKey, ProjectId, SegmentId, WatcherId};
pub use job_kind::JobKind;
pub use project::{Project, SegmentRef};
pub use segment::VideoSegment;
pub use status::StageStatus;
pub use transition::{
    StageState, Transition, TransitionError, TransitionPlan, TransitionResult, Transitionable,
};
pub use watcher::{WatcherKind, WatcherTask};
