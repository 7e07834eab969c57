//! At-least-once job queue for pipeline stages.
//!
//! This crate provides:
//! - The `QueuePort` contract (enqueue/dequeue/ack)
//! - Stage job payloads carrying idempotency tokens
//! - An in-memory backend and a Redis Streams backend with consumer groups and DLQ

pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod port;
pub mod redis_stream;

pub use config::{QueueBackend, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use job::{ConcatJob, PdfSplitJob, SegmentRenderJob, StageJob};
pub use memory::MemoryQueue;
pub use port::{Delivery, QueuePort};
pub use redis_stream::RedisStreamQueue;
