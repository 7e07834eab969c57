//! Queue port over Redis Streams, one stream per stage.

use async_trait::async_trait;
use redis::AsyncCommands;
use s2v_models::JobKind;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::port::{Delivery, QueuePort};

/// Redis Streams queue for one job kind, consumed through a consumer group.
pub struct RedisStreamQueue {
    client: redis::Client,
    config: QueueConfig,
    stream_name: String,
}

impl RedisStreamQueue {
    pub fn new(config: QueueConfig, kind: JobKind) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            stream_name: config.stream_name(kind),
            config,
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Create the consumer group if it does not exist.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(stream = %self.stream_name, "Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %self.stream_name, "Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    fn to_deliveries(entries: Vec<redis::streams::StreamId>) -> Vec<Delivery> {
        entries
            .into_iter()
            .filter_map(|entry| match entry.map.get("job") {
                Some(redis::Value::BulkString(payload)) => Some(Delivery {
                    message_id: entry.id.clone(),
                    payload: payload.clone(),
                }),
                _ => {
                    warn!(message_id = %entry.id, "Stream entry without job payload");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl QueuePort for RedisStreamQueue {
    async fn enqueue(&self, payload: Vec<u8>) -> QueueResult<String> {
        let mut conn = self
            .connection()
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("*")
            .arg("job")
            .arg(payload.as_slice())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        debug!(stream = %self.stream_name, message_id = %message_id, "Enqueued message");
        Ok(message_id)
    }

    async fn dequeue(&self, max: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(max)
            .arg("BLOCK")
            .arg(self.config.block_ms)
            .arg("STREAMS")
            .arg(&self.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        Ok(reply
            .keys
            .into_iter()
            .flat_map(|key| Self::to_deliveries(key.ids))
            .collect())
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(stream = %self.stream_name, "Acknowledged message: {}", message_id);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(&self.stream_name).await?)
    }
}
