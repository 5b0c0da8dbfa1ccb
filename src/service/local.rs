use std::collections::BTreeMap;
use std::sync::Arc;

use crate::detection::CascadeDetector;
use crate::error::CollaboratorError;
use crate::grouping::GroupingEngine;
use crate::models::Detection;
use crate::service::contract::{DetectRequest, GroupRequest, VisualizeRequest};
use crate::service::{DetectStage, GroupStage, VisualizeStage};
use crate::visualize::Visualizer;

/// Run CPU-bound stage work off the async runtime. Errors from the work
/// itself are the stage rejecting the request.
async fn run_blocking<T, F>(work: F) -> Result<T, CollaboratorError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CollaboratorError::Rejected(format!("{e:#}"))),
        Err(e) => Err(CollaboratorError::Unavailable(format!("worker task failed: {e}"))),
    }
}

/// Detection stage running the cascade in this process.
#[derive(Clone)]
pub struct LocalDetect {
    detector: Arc<CascadeDetector>,
}

impl LocalDetect {
    pub fn new(detector: Arc<CascadeDetector>) -> Self {
        Self { detector }
    }

    pub fn capabilities(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([(
            "learned_detector".to_string(),
            self.detector.primary_available(),
        )])
    }
}

impl DetectStage for LocalDetect {
    async fn detect(&self, request: DetectRequest) -> Result<Vec<Detection>, CollaboratorError> {
        let detector = Arc::clone(&self.detector);
        run_blocking(move || {
            let image = request.image.decode()?;
            tracing::info!("processing image of size {}x{}", image.width(), image.height());
            let detections = detector.detect(&image);
            tracing::info!("detected {} products", detections.len());
            Ok(detections)
        })
        .await
    }

    async fn healthy(&self) -> bool {
        true
    }
}

/// Grouping stage running the grouping engine in this process.
#[derive(Clone)]
pub struct LocalGroup {
    engine: Arc<GroupingEngine>,
}

impl LocalGroup {
    pub fn new(engine: Arc<GroupingEngine>) -> Self {
        Self { engine }
    }

    pub fn capabilities(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([
            (
                "feature_model".to_string(),
                self.engine.feature_model_available(),
            ),
            (
                "text_recognition".to_string(),
                self.engine.text_recognition_available(),
            ),
        ])
    }
}

impl GroupStage for LocalGroup {
    async fn group(&self, request: GroupRequest) -> Result<Vec<Detection>, CollaboratorError> {
        let engine = Arc::clone(&self.engine);
        run_blocking(move || {
            let image = request.image.decode()?;
            tracing::info!("grouping {} products", request.detections.len());
            Ok(engine.group(&image, request.detections)?)
        })
        .await
    }

    async fn healthy(&self) -> bool {
        true
    }
}

/// Visualization stage writing result images to a local directory.
#[derive(Clone)]
pub struct LocalVisualize {
    visualizer: Arc<Visualizer>,
}

impl LocalVisualize {
    pub fn new(visualizer: Arc<Visualizer>) -> Self {
        Self { visualizer }
    }
}

impl VisualizeStage for LocalVisualize {
    async fn visualize(&self, request: VisualizeRequest) -> Result<String, CollaboratorError> {
        let visualizer = Arc::clone(&self.visualizer);
        run_blocking(move || {
            let image = request.image.decode()?;
            tracing::info!("visualizing {} products", request.detections.len());
            let path = visualizer.render_to_file(&image, &request.detections)?;
            Ok(path.display().to_string())
        })
        .await
    }

    async fn healthy(&self) -> bool {
        true
    }
}
