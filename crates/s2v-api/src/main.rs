//! Axum API server binary.
//!
//! Serves the HTTP surface and runs the completion reconciler in-process.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use s2v_api::{create_router, metrics, ApiConfig, AppState};
use s2v_pipeline::{PipelineConfig, PipelineStores, Reconciler, StageQueues};
use s2v_queue::QueueConfig;
use s2v_store::{FirestoreClient, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing()?;

    info!("Starting s2v-api");

    let config = ApiConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let stores = match StoreBackend::from_env() {
        StoreBackend::Memory => {
            warn!("Using in-memory entity store; state is lost on restart");
            PipelineStores::in_memory()
        }
        StoreBackend::Firestore => {
            let client = FirestoreClient::from_env()
                .await
                .context("Failed to create Firestore client")?;
            PipelineStores::firestore(client)
        }
    };
    let queues = StageQueues::from_config(&queue_config)
        .await
        .context("Failed to initialize stage queues")?;
    info!("Queue backend: {:?}", queue_config.backend);

    let state = AppState::new(config.clone(), &pipeline_config, stores, queues);

    // Initialize metrics
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    // Start completion reconciler background task
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&state.dispatcher),
        pipeline_config.clone(),
    ));
    let reconciler_task = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move {
            reconciler.run().await;
        })
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reconciler.shutdown();
    let grace = pipeline_config.shutdown_timeout + std::time::Duration::from_secs(1);
    if tokio::time::timeout(grace, reconciler_task).await.is_err() {
        warn!("Reconciler did not stop within {:?}", grace);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("s2v=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
