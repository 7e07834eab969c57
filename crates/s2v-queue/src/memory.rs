//! In-process queue.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::port::{Delivery, QueuePort};

#[derive(Default)]
struct Inner {
    next_id: u64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<String, Delivery>,
}

/// FIFO queue kept in memory. Dequeued messages stay in flight until acked.
pub struct MemoryQueue {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Return every in-flight message to the front of the queue.
    pub async fn redeliver_in_flight(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let mut pending: Vec<Delivery> = inner.in_flight.drain().map(|(_, d)| d).collect();
        pending.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        let count = pending.len();
        for delivery in pending.into_iter().rev() {
            inner.ready.push_front(delivery);
        }
        count
    }
}

#[async_trait]
impl QueuePort for MemoryQueue {
    async fn enqueue(&self, payload: Vec<u8>) -> QueueResult<String> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let message_id = format!("{}-{:020}", self.name, inner.next_id);
        inner.ready.push_back(Delivery {
            message_id: message_id.clone(),
            payload,
        });
        debug!(queue = %self.name, message_id = %message_id, "Enqueued message");
        Ok(message_id)
    }

    async fn dequeue(&self, max: usize) -> QueueResult<Vec<Delivery>> {
        let mut inner = self.inner.lock().await;
        let take = max.min(inner.ready.len());
        let batch: Vec<Delivery> = inner.ready.drain(..take).collect();
        for delivery in &batch {
            inner
                .in_flight
                .insert(delivery.message_id.clone(), delivery.clone());
        }
        Ok(batch)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        self.inner
            .lock()
            .await
            .in_flight
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::MessageNotFound(message_id.to_string()))
    }

    async fn len(&self) -> QueueResult<u64> {
        let inner = self.inner.lock().await;
        Ok((inner.ready.len() + inner.in_flight.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_and_ack() {
        let queue = MemoryQueue::new("render");
        queue.enqueue(b"a".to_vec()).await.unwrap();
        queue.enqueue(b"b".to_vec()).await.unwrap();
        queue.enqueue(b"c".to_vec()).await.unwrap();

        let first = queue.dequeue(2).await.unwrap();
        assert_eq!(first.iter().map(|d| d.payload.clone()).collect::<Vec<_>>(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(queue.len().await.unwrap(), 3);

        queue.ack(&first[0].message_id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);
        assert!(queue.ack(&first[0].message_id).await.is_err());
    }

    #[tokio::test]
    async fn test_redelivery() {
        let queue = MemoryQueue::new("concat");
        queue.enqueue(b"x".to_vec()).await.unwrap();
        let delivered = queue.dequeue(10).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(queue.dequeue(10).await.unwrap().is_empty());

        assert_eq!(queue.redeliver_in_flight().await, 1);
        let again = queue.dequeue(10).await.unwrap();
        assert_eq!(again, delivered);
    }
}
