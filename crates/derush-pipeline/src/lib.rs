//! Silence detection, keep-range planning and pipeline orchestration.
//!
//! This crate drives the full de-rush run:
//! resolve -> fetch (audio ∥ video) -> mux -> detect silence -> plan keeps
//! -> cut -> concat, producing either an output artifact path or a
//! stage-tagged failure.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod silence;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::{AnalysisError, PipelineError, Stage};
pub use orchestrator::{CancelHandle, Pipeline, Source};
pub use planner::plan_keep_ranges;
pub use progress::{ProgressEvent, ProgressSink};
pub use silence::SilenceDetector;
