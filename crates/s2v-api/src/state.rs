//! Application state.

use std::sync::Arc;

use s2v_pipeline::{Dispatcher, PipelineConfig, PipelineStores, StageQueues, StatusGateway};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub gateway: Arc<StatusGateway>,
    pub stores: PipelineStores,
    pub queues: StageQueues,
}

impl AppState {
    /// Wire the dispatcher and gateway over the given backends.
    pub fn new(
        config: ApiConfig,
        pipeline: &PipelineConfig,
        stores: PipelineStores,
        queues: StageQueues,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(stores.clone(), queues.clone(), pipeline));
        Self {
            config,
            gateway: Arc::new(StatusGateway::new(Arc::clone(&dispatcher))),
            dispatcher,
            stores,
            queues,
        }
    }

    /// State over in-memory stores and queues.
    pub fn in_memory(config: ApiConfig) -> Self {
        Self::new(
            config,
            &PipelineConfig::default(),
            PipelineStores::in_memory(),
            StageQueues::in_memory(),
        )
    }
}
