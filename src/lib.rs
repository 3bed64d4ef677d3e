// THEORY:
// This file is the main entry point for the `loi_vision` library crate.
// The public face of the engine is the `LocationPipeline` (synchronous, one call per
// depth frame) and the `LocationService` that drives a pipeline from an
// asynchronous frame stream. Both are configured by a single `PipelineConfig`.
//
// The stages themselves live in `core_modules` and can be used on their own:
// motion extraction, region segmentation, region analysis, volume classification
// and debouncing. Each one is a plain struct with no knowledge of the others; the
// pipeline is the only place they are wired together.

pub mod core_modules;
pub mod error;
pub mod location_service;
pub mod pipeline;

pub use error::{LocationError, Result};
pub use location_service::{FrameOutcome, LocationService};
pub use pipeline::{FrameReport, LocationPipeline, PipelineConfig};
