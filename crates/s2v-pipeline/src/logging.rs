//! Structured stage logging utilities.

use s2v_models::JobKind;
use tracing::{error, info, warn, Span};

/// Logger carrying the entity id and stage of a pipeline operation.
#[derive(Debug, Clone)]
pub struct StageLogger {
    entity_id: String,
    stage: JobKind,
}

impl StageLogger {
    pub fn new(stage: JobKind, entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(entity_id = %self.entity_id, stage = %self.stage, "Stage started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(entity_id = %self.entity_id, stage = %self.stage, "Stage progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(entity_id = %self.entity_id, stage = %self.stage, "Stage warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(entity_id = %self.entity_id, stage = %self.stage, "Stage error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(entity_id = %self.entity_id, stage = %self.stage, "Stage completed: {}", message);
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn stage(&self) -> JobKind {
        self.stage
    }

    /// Span for instrumenting a whole stage operation.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("stage", entity_id = %self.entity_id, stage = %self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_logger_creation() {
        let logger = StageLogger::new(JobKind::SegmentRender, "seg-1");
        assert_eq!(logger.entity_id(), "seg-1");
        assert_eq!(logger.stage(), JobKind::SegmentRender);
    }
}
