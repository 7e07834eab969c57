//! Video segment handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use s2v_models::{ProjectId, SegmentId, StageStatus, VideoSegment};
use s2v_pipeline::SegmentEdit;
use s2v_store::EntityKey;

use crate::error::ApiResult;
use crate::handlers::check_entity_id;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SegmentView {
    pub id: String,
    pub project_id: String,
    pub order: u32,
    pub image_id: String,
    pub script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_output_id: Option<String>,
    pub hidden: bool,
    pub status: StageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoSegment> for SegmentView {
    fn from(segment: VideoSegment) -> Self {
        Self {
            status: segment.status(),
            id: segment.id.to_string(),
            project_id: segment.project_id.to_string(),
            order: segment.order,
            image_id: segment.image_id,
            script: segment.script,
            video_output_id: segment.video_output_id,
            hidden: segment.hidden,
            created_at: segment.created_at,
            updated_at: segment.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SegmentListResponse {
    pub segments: Vec<SegmentView>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditSegmentRequest {
    #[validate(length(max = 20000))]
    pub script: Option<String>,
    pub hidden: Option<bool>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Segments of a project in page order.
pub async fn list_segments(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<SegmentListResponse>> {
    check_entity_id("project", &project_id)?;
    let project_id = ProjectId::from_string(project_id);

    // Unknown projects are 404, not an empty list.
    state
        .stores
        .projects
        .get(&EntityKey::root(project_id.as_str()))
        .await?;

    let segments = state.dispatcher.list_segments(&project_id).await?;
    Ok(Json(SegmentListResponse {
        segments: segments.into_iter().map(SegmentView::from).collect(),
    }))
}

pub async fn get_segment(
    State(state): State<AppState>,
    Path((project_id, segment_id)): Path<(String, String)>,
) -> ApiResult<Json<SegmentView>> {
    check_entity_id("project", &project_id)?;
    check_entity_id("segment", &segment_id)?;

    let segment = state
        .stores
        .segments
        .get(&EntityKey::child(project_id, segment_id))
        .await?;

    Ok(Json(segment.into()))
}

/// User edit of script or visibility.
pub async fn edit_segment(
    State(state): State<AppState>,
    Path((project_id, segment_id)): Path<(String, String)>,
    payload: Result<Json<EditSegmentRequest>, JsonRejection>,
) -> ApiResult<Json<SegmentView>> {
    check_entity_id("project", &project_id)?;
    check_entity_id("segment", &segment_id)?;
    let Json(request) = payload?;
    request.validate()?;

    let edit = SegmentEdit {
        script: request.script,
        hidden: request.hidden,
    };
    let segment = state
        .dispatcher
        .edit_segment(
            &ProjectId::from_string(project_id),
            &SegmentId::from_string(segment_id),
            edit,
        )
        .await?;

    Ok(Json(segment.into()))
}

/// Operator re-dispatch of a segment stuck in created.
pub async fn generate_segment(
    State(state): State<AppState>,
    Path((project_id, segment_id)): Path<(String, String)>,
) -> ApiResult<Json<SegmentView>> {
    check_entity_id("project", &project_id)?;
    check_entity_id("segment", &segment_id)?;

    let segment = state
        .dispatcher
        .redispatch_segment(
            &ProjectId::from_string(project_id),
            &SegmentId::from_string(segment_id),
        )
        .await?;
    info!(segment_id = %segment.id, "Segment render re-dispatched");

    Ok(Json(segment.into()))
}
