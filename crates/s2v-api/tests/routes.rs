//! Router tests driven in-process over in-memory backends.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use s2v_api::{create_router, ApiConfig, AppState};
use s2v_queue::{PdfSplitJob, SegmentRenderJob, StageJob};

fn app() -> (Router, AppState) {
    let state = AppState::in_memory(ApiConfig::default());
    (create_router(state.clone(), None), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn take_jobs<J: StageJob>(queue: &std::sync::Arc<dyn s2v_queue::QueuePort>) -> Vec<J> {
    let deliveries = queue.dequeue(100).await.unwrap();
    let mut jobs = Vec::new();
    for delivery in deliveries {
        queue.ack(&delivery.message_id).await.unwrap();
        jobs.push(J::decode(&delivery.payload).unwrap());
    }
    jobs
}

/// Create a project and complete its extraction with two pages.
async fn extracted(app: &Router, state: &AppState) -> (String, Vec<SegmentRenderJob>) {
    let (status, project) = send(
        app,
        Method::POST,
        "/api/v1/project",
        Some(json!({"source_document": "gs://decks/q3.pdf"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = project["id"].as_str().unwrap().to_string();

    let split: PdfSplitJob = take_jobs(&state.queues.pdf_split).await.remove(0);
    let uri = format!("/api/v1/project/{}/pdfslideimages/{}", project_id, split.id);
    let (status, body) = send(
        app,
        Method::PUT,
        &uri,
        Some(json!({
            "status": "completed",
            "idem_key_running": split.idem_key_running,
            "idem_key_complete_rec": split.idem_key_complete_rec,
            "slide_assets": [
                {"image_id": "img-2", "order": 2},
                {"image_id": "img-1", "order": 1}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");

    let mut jobs: Vec<SegmentRenderJob> = take_jobs(&state.queues.segment_render).await;
    jobs.sort_by_key(|j| j.order);
    (project_id, jobs)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let (app, _) = app();
    let (status, _) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_project_validation() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/project",
        Some(json!({"source_document": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, _) = send(&app, Method::POST, "/api/v1/project", Some(json!({"doc": "x"}))).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_get_project_hides_tokens() {
    let (app, _) = app();
    let (_, created) = send(
        &app,
        Method::POST,
        "/api/v1/project",
        Some(json!({"source_document": "deck.pdf"})),
    )
    .await;
    let uri = format!("/api/v1/project/{}", created["id"].as_str().unwrap());

    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "created");
    assert!(body.get("running_token").is_none());
    assert!(body.get("complete_token").is_none());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let (app, _) = app();
    let (status, _) = send(&app, Method::GET, "/api/v1/project/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/v1/project/bad_id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/project/p-1/videosegment/s-1",
        Some(json!({"status": "running", "idem_key_running": "k"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_segment_callbacks() {
    let (app, state) = app();
    let (project_id, jobs) = extracted(&app, &state).await;
    assert_eq!(jobs.len(), 2);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/project/{}/videosegments", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let images: Vec<_> = body["segments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["image_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(images, vec!["img-1", "img-2"]);

    let uri = format!("/api/v1/project/{}/videosegment/{}", project_id, jobs[0].id);

    let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"status": "done"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing running token for a running report.
    let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"status": "running"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Created cannot skip straight to completed.
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({
            "status": "completed",
            "idem_key_complete_rec": jobs[0].idem_key_complete_rec,
            "video_file": "v1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let completed = json!({
        "status": "completed",
        "idem_key_running": jobs[0].idem_key_running,
        "idem_key_complete_rec": jobs[0].idem_key_complete_rec,
        "video_file": "v1"
    });
    let (status, body) = send(&app, Method::PUT, &uri, Some(completed.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");

    let (status, body) = send(&app, Method::PUT, &uri, Some(completed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (_, segment) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(segment["status"], "completed");
    assert_eq!(segment["video_output_id"], "v1");
}

#[tokio::test]
async fn test_edit_and_redispatch_segment() {
    let (app, state) = app();
    let (project_id, jobs) = extracted(&app, &state).await;
    let uri = format!("/api/v1/project/{}/videosegment/{}", project_id, jobs[1].id);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(json!({"script": "Quarterly results", "hidden": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["script"], "Quarterly results");
    assert_eq!(body["hidden"], true);

    let (status, _) = send(&app, Method::PATCH, &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let generate = format!("{}/generate", uri);
    let (status, _) = send(&app, Method::POST, &generate, None).await;
    assert_eq!(status, StatusCode::OK);
    let redispatched: Vec<SegmentRenderJob> = take_jobs(&state.queues.segment_render).await;
    assert_eq!(redispatched.len(), 1);
    assert_eq!(redispatched[0].script, "Quarterly results");
    assert_ne!(redispatched[0].idem_key_running, jobs[1].idem_key_running);

    // The old delivery's tokens are stale now.
    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({"status": "running", "idem_key_running": jobs[1].idem_key_running})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({"status": "running", "idem_key_running": redispatched[0].idem_key_running})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::POST, &generate, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extraction_error_marks_project_error() {
    let (app, state) = app();
    let (_, project) = send(
        &app,
        Method::POST,
        "/api/v1/project",
        Some(json!({"source_document": "deck.pdf"})),
    )
    .await;
    let project_id = project["id"].as_str().unwrap();
    let split: PdfSplitJob = take_jobs(&state.queues.pdf_split).await.remove(0);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/project/{}/pdfslideimages/{}", project_id, split.id),
        Some(json!({"status": "error", "idem_key_complete_rec": split.idem_key_complete_rec})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/project/{}", project_id), None).await;
    assert_eq!(body["status"], "error");
}
