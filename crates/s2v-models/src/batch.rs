//! Image extraction batch: one per project, produced pages drive fan-out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, ProjectId};
use crate::status::StageStatus;
use crate::transition::{StageState, Transition, TransitionError, TransitionResult, Transitionable};

/// One extracted page image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageImage {
    pub image_id: String,
    pub order: u32,
}

impl PageImage {
    pub fn new(image_id: impl Into<String>, order: u32) -> Self {
        Self {
            image_id: image_id.into(),
            order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageExtractionBatch {
    pub id: BatchId,
    pub project_id: ProjectId,
    pub source_document: String,

    #[serde(flatten)]
    pub stage: StageState,

    /// Produced pages, sorted by order
    #[serde(default)]
    pub pages: Vec<PageImage>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageExtractionBatch {
    pub fn new(project_id: ProjectId, source_document: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: BatchId::new(),
            project_id,
            source_document: source_document.into(),
            stage: StageState::fresh(),
            pages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> StageStatus {
        self.stage.status
    }
}

fn validate_pages(pages: &[PageImage]) -> TransitionResult<Vec<PageImage>> {
    if pages.is_empty() {
        return Err(TransitionError::validation("empty page list"));
    }
    let mut seen = HashSet::new();
    for page in pages {
        if page.image_id.trim().is_empty() {
            return Err(TransitionError::validation(format!(
                "page {} has an empty image id",
                page.order
            )));
        }
        if !seen.insert(page.order) {
            return Err(TransitionError::validation(format!(
                "duplicate page order {}",
                page.order
            )));
        }
    }
    let mut sorted = pages.to_vec();
    sorted.sort_by_key(|p| p.order);
    Ok(sorted)
}

impl Transitionable for ImageExtractionBatch {
    const KIND: &'static str = "image extraction batch";

    fn apply_transition(&mut self, command: &Transition) -> TransitionResult<()> {
        if let Some(result) = self.stage.apply_common(command) {
            return result;
        }
        match command {
            Transition::AttachPages(pages) => {
                self.pages = validate_pages(pages)?;
                Ok(())
            }
            other => Err(Self::unsupported(other)),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> ImageExtractionBatch {
        ImageExtractionBatch::new(ProjectId::from_string("p"), "deck.pdf")
    }

    #[test]
    fn test_attach_pages_sorts_by_order() {
        let mut b = batch();
        b.apply_transition(&Transition::AttachPages(vec![
            PageImage::new("img-3", 3),
            PageImage::new("img-1", 1),
            PageImage::new("img-2", 2),
        ]))
        .unwrap();
        let orders: Vec<u32> = b.pages.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_attach_pages_validation() {
        let mut b = batch();
        assert!(b.apply_transition(&Transition::AttachPages(vec![])).is_err());
        assert!(b
            .apply_transition(&Transition::AttachPages(vec![
                PageImage::new("a", 1),
                PageImage::new("b", 1),
            ]))
            .is_err());
        assert!(b
            .apply_transition(&Transition::AttachPages(vec![PageImage::new(" ", 1)]))
            .is_err());
        assert!(b.pages.is_empty());
    }
}
