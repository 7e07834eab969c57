//! Worker callback handlers.
//!
//! Each stage reports to its own endpoint with the same body shape. Replayed
//! callbacks answer 200 with `outcome: "duplicate"`.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use s2v_models::{IdemKey, JobKind, PageImage, ProjectId, StageStatus};
use s2v_pipeline::{CallbackOutcome, StatusCallback};

use crate::error::{ApiError, ApiResult};
use crate::handlers::check_entity_id;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    /// `running`, `completed` or `error`
    pub status: String,
    #[serde(default)]
    pub idem_key_running: Option<String>,
    #[serde(default)]
    pub idem_key_complete_rec: Option<String>,
    /// Extraction output
    #[serde(default, alias = "slide_assets")]
    pub pages: Option<Vec<PageImage>>,
    /// Render or concat output
    #[serde(default, alias = "video_file")]
    pub video_output_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    pub outcome: &'static str,
}

impl From<CallbackOutcome> for CallbackResponse {
    fn from(outcome: CallbackOutcome) -> Self {
        Self {
            status: "ok",
            outcome: outcome.as_str(),
        }
    }
}

fn non_blank(key: Option<String>) -> Option<IdemKey> {
    key.filter(|k| !k.trim().is_empty()).map(IdemKey::from_string)
}

impl CallbackRequest {
    fn into_callback(
        self,
        kind: JobKind,
        project_id: String,
        entity_id: String,
    ) -> ApiResult<StatusCallback> {
        let status = StageStatus::from_str(&self.status)
            .map_err(|e| ApiError::bad_request(format!("Invalid status: {}", e)))?;

        let mut callback = StatusCallback::new(
            kind,
            ProjectId::from_string(project_id),
            entity_id,
            status,
        );
        callback.running_key = non_blank(self.idem_key_running);
        callback.complete_key = non_blank(self.idem_key_complete_rec);
        callback.pages = self.pages;
        callback.video_output_id = self.video_output_id;
        Ok(callback)
    }
}

async fn dispatch(
    state: &AppState,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
    kind: JobKind,
    project_id: String,
    entity_id: String,
) -> ApiResult<Json<CallbackResponse>> {
    let Json(request) = payload?;
    let callback = request.into_callback(kind, project_id, entity_id)?;
    let outcome = state.gateway.handle(callback).await?;
    Ok(Json(outcome.into()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Concat worker callback.
pub async fn project_callback(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    check_entity_id("project", &project_id)?;
    let entity_id = project_id.clone();
    dispatch(&state, payload, JobKind::Concat, project_id, entity_id).await
}

/// PDF split worker callback.
pub async fn batch_callback(
    State(state): State<AppState>,
    Path((project_id, batch_id)): Path<(String, String)>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    check_entity_id("project", &project_id)?;
    check_entity_id("batch", &batch_id)?;
    dispatch(&state, payload, JobKind::PdfSplit, project_id, batch_id).await
}

/// Segment render worker callback.
pub async fn segment_callback(
    State(state): State<AppState>,
    Path((project_id, segment_id)): Path<(String, String)>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    check_entity_id("project", &project_id)?;
    check_entity_id("segment", &segment_id)?;
    dispatch(&state, payload, JobKind::SegmentRender, project_id, segment_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_body_aliases() {
        let body = serde_json::json!({
            "status": "completed",
            "idem_key_running": "r",
            "idem_key_complete_rec": "c",
            "slide_assets": [{"image_id": "img-1", "order": 1}],
        });
        let request: CallbackRequest = serde_json::from_value(body).unwrap();
        let callback = request
            .into_callback(JobKind::PdfSplit, "p".into(), "b".into())
            .unwrap();
        assert_eq!(callback.status, StageStatus::Completed);
        assert_eq!(callback.pages.unwrap()[0].image_id, "img-1");

        let body = serde_json::json!({"status": "completed", "video_file": "v1"});
        let request: CallbackRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.video_output_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_blank_tokens_are_absent() {
        let body = serde_json::json!({"status": "running", "idem_key_running": "  "});
        let request: CallbackRequest = serde_json::from_value(body).unwrap();
        let callback = request
            .into_callback(JobKind::SegmentRender, "p".into(), "s".into())
            .unwrap();
        assert!(callback.running_key.is_none());
    }

    #[test]
    fn test_unknown_status_is_bad_request() {
        let body = serde_json::json!({"status": "finished"});
        let request: CallbackRequest = serde_json::from_value(body).unwrap();
        let err = request
            .into_callback(JobKind::Concat, "p".into(), "p".into())
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
