//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    batch_callback, create_project, edit_segment, generate_segment, get_batch, get_project,
    get_segment, health, list_segments, project_callback, ready, segment_callback,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let project_routes = Router::new()
        .route("/project", post(create_project))
        // GET for clients, PUT for the concat worker
        .route("/project/:project_id", get(get_project).put(project_callback))
        .route(
            "/project/:project_id/pdfslideimages/:batch_id",
            get(get_batch).put(batch_callback),
        );

    let segment_routes = Router::new()
        .route("/project/:project_id/videosegments", get(list_segments))
        .route(
            "/project/:project_id/videosegment/:segment_id",
            get(get_segment).put(segment_callback).patch(edit_segment),
        )
        .route(
            "/project/:project_id/videosegment/:segment_id/generate",
            post(generate_segment),
        );

    let api_routes = Router::new().merge(project_routes).merge(segment_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
