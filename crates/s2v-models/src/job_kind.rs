//! Stage job kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of work dispatched to an external worker.
///
/// Each kind has its own queue and its own callback endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Rasterize the source document into one image per page
    PdfSplit,
    /// Render one narrated video segment for a page
    SegmentRender,
    /// Concatenate all segment videos into the project output
    Concat,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::PdfSplit, JobKind::SegmentRender, JobKind::Concat];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PdfSplit => "pdf_split",
            JobKind::SegmentRender => "segment_render",
            JobKind::Concat => "concat",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
