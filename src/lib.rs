pub mod capability;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod grouping;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod visualize;

pub use capability::Capability;
pub use config::Config;
pub use detection::{CascadeDetector, CascadeReport, ObjectDetector, Tier};
pub use error::{CollaboratorError, PipelineError, Stage};
pub use geometry::overlap_ratio;
pub use grouping::{GroupingEngine, TextFragment};
pub use models::{BoundingBox, Detection, GroupLabel};
pub use pipeline::{Orchestrator, PipelineReport, PipelineState, RunSummary, StageOutcome};
pub use visualize::Visualizer;
