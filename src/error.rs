use std::fmt;

use thiserror::Error;

/// Pipeline stage that talks to a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Grouping,
    Visualization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Detection => "Detection",
            Stage::Grouping => "Grouping",
            Stage::Visualization => "Visualization",
        })
    }
}

/// Failure of a single collaborator call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Network error, timeout or unusable reply.
    #[error("{0}")]
    Unavailable(String),
    /// Reachable, but answered `success: false`.
    #[error("{0}")]
    Rejected(String),
}

/// Terminal failure of one pipeline run.
///
/// The `Display` text is what callers see in the top-level `error` field and
/// always starts with a stage-specific prefix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("No products detected in image")]
    NoDetections,
    #[error("{stage} service not responding: {detail}")]
    CollaboratorUnavailable { stage: Stage, detail: String },
    #[error("{stage} failed: {message}")]
    CollaboratorRejected { stage: Stage, message: String },
}

impl PipelineError {
    pub fn from_collaborator(stage: Stage, err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Unavailable(detail) => {
                PipelineError::CollaboratorUnavailable { stage, detail }
            }
            CollaboratorError::Rejected(message) => {
                PipelineError::CollaboratorRejected { stage, message }
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupingError {
    #[error("Missing image or detections data")]
    MissingInput,
}
