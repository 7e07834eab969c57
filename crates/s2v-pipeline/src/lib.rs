//! Pipeline orchestration for Slides2Video.
//!
//! This crate provides:
//! - The stage dispatcher (project submission, extraction fan-out, concat trigger)
//! - The status update gateway for worker callbacks
//! - The completion reconciler that fires concat once every segment is done
//! - Pipeline configuration, stage logging and metrics

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod reconciler;

pub use config::PipelineConfig;
pub use context::{PipelineStores, StageQueues};
pub use dispatcher::{ConcatInput, Dispatcher, SegmentEdit};
pub use error::{PipelineError, PipelineResult};
pub use gateway::{CallbackOutcome, StatusCallback, StatusGateway};
pub use logging::StageLogger;
pub use reconciler::{CycleReport, ReconcileOutcome, Reconciler};
