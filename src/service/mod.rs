//! Stage collaborators: the call contract, in-process implementations, an
//! HTTP client for remote ones and the HTTP server exposing them.

pub mod client;
pub mod contract;
pub mod local;
pub mod server;

use std::future::Future;

use crate::error::CollaboratorError;
use crate::models::Detection;

pub use client::{HttpDetect, HttpGroup, HttpStage, HttpVisualize};
pub use contract::{
    DetectRequest, DetectResponse, EncodedImage, GroupRequest, GroupResponse, HealthResponse,
    ProcessResponse, VisualizeRequest, VisualizeResponse,
};
pub use local::{LocalDetect, LocalGroup, LocalVisualize};

/// Finds products in an image.
pub trait DetectStage: Send + Sync {
    fn detect(
        &self,
        request: DetectRequest,
    ) -> impl Future<Output = Result<Vec<Detection>, CollaboratorError>> + Send;

    fn healthy(&self) -> impl Future<Output = bool> + Send;
}

/// Fills in the grouping fields of every detection.
pub trait GroupStage: Send + Sync {
    fn group(
        &self,
        request: GroupRequest,
    ) -> impl Future<Output = Result<Vec<Detection>, CollaboratorError>> + Send;

    fn healthy(&self) -> impl Future<Output = bool> + Send;
}

/// Renders grouped detections and returns a reference to the artifact.
pub trait VisualizeStage: Send + Sync {
    fn visualize(
        &self,
        request: VisualizeRequest,
    ) -> impl Future<Output = Result<String, CollaboratorError>> + Send;

    fn healthy(&self) -> impl Future<Output = bool> + Send;
}
