//! The queue port contract.

use async_trait::async_trait;

use crate::error::QueueResult;

/// A message handed to a consumer. Must be acked once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub payload: Vec<u8>,
}

/// At-least-once message channel for one stage.
///
/// Delivery may repeat and is unordered across messages; consumers must be
/// idempotent.
#[async_trait]
pub trait QueuePort: Send + Sync {
    /// Publish an opaque payload, returning the message id.
    async fn enqueue(&self, payload: Vec<u8>) -> QueueResult<String>;

    /// Take up to `max` unacknowledged messages.
    async fn dequeue(&self, max: usize) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivered message as handled.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Messages not yet acknowledged.
    async fn len(&self) -> QueueResult<u64>;
}
