//! Queue configuration.

use s2v_models::JobKind;

/// Which queue transport to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Memory,
    Redis,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Redis URL
    pub redis_url: String,
    /// Prefix of the per-stage stream names
    pub stream_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Name of this process within the consumer group
    pub consumer_name: String,
    /// Blocking read timeout for consumers
    pub block_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            stream_prefix: "s2v:jobs".to_string(),
            consumer_group: "s2v:workers".to_string(),
            consumer_name: format!("s2v-{}", uuid::Uuid::new_v4()),
            block_ms: 5000,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: match std::env::var("QUEUE_BACKEND")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str()
            {
                "redis" => QueueBackend::Redis,
                _ => QueueBackend::Memory,
            },
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_prefix: std::env::var("QUEUE_STREAM_PREFIX").unwrap_or(defaults.stream_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            consumer_name: std::env::var("QUEUE_CONSUMER_NAME").unwrap_or(defaults.consumer_name),
            block_ms: std::env::var("QUEUE_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.block_ms),
        }
    }

    /// Stream carrying jobs of `kind`.
    pub fn stream_name(&self, kind: JobKind) -> String {
        format!("{}:{}", self.stream_prefix, kind.as_str())
    }
}
