//! Project and extraction batch handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use s2v_models::{ImageExtractionBatch, PageImage, Project, SegmentRef, StageStatus};
use s2v_store::EntityKey;

use crate::error::ApiResult;
use crate::handlers::check_entity_id;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    /// Location of the slide deck to convert
    #[validate(length(min = 1, max = 2048))]
    pub source_document: String,
}

/// Project as exposed to clients. Idempotency tokens are never included.
#[derive(Debug, Serialize)]
pub struct ProjectView {
    pub id: String,
    pub status: StageStatus,
    pub source_document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_batch_id: Option<String>,
    pub segments: Vec<SegmentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_output_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectView {
    fn from(project: Project) -> Self {
        Self {
            id: project.id.to_string(),
            status: project.status(),
            source_document: project.source_document,
            extraction_batch_id: project.extraction_batch_id.map(|id| id.to_string()),
            segments: project.segments,
            video_output_id: project.video_output_id,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchView {
    pub id: String,
    pub project_id: String,
    pub status: StageStatus,
    pub source_document: String,
    pub pages: Vec<PageImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ImageExtractionBatch> for BatchView {
    fn from(batch: ImageExtractionBatch) -> Self {
        Self {
            id: batch.id.to_string(),
            project_id: batch.project_id.to_string(),
            status: batch.status(),
            source_document: batch.source_document,
            pages: batch.pages,
            created_at: batch.created_at,
            updated_at: batch.updated_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a document for conversion.
pub async fn create_project(
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProjectView>)> {
    let Json(request) = payload?;
    request.validate()?;

    let project = state.dispatcher.submit_project(&request.source_document).await?;
    info!(project_id = %project.id, "Project submitted");

    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectView>> {
    check_entity_id("project", &project_id)?;

    let project = state
        .stores
        .projects
        .get(&EntityKey::root(project_id))
        .await?;

    Ok(Json(project.into()))
}

pub async fn get_batch(
    State(state): State<AppState>,
    Path((project_id, batch_id)): Path<(String, String)>,
) -> ApiResult<Json<BatchView>> {
    check_entity_id("project", &project_id)?;
    check_entity_id("batch", &batch_id)?;

    let batch = state
        .stores
        .batches
        .get(&EntityKey::child(project_id, batch_id))
        .await?;

    Ok(Json(batch.into()))
}
