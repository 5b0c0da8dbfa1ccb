#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::RgbImage;

use shelfscan::capability::Capability;
use shelfscan::config::{DetectionConfig, FallbackConfig, GroupingConfig};
use shelfscan::detection::{CascadeDetector, FallbackDetector, ObjectDetector};
use shelfscan::error::CollaboratorError;
use shelfscan::grouping::{
    BrandTable, FeatureExtractor, FeatureVector, GroupingEngine, TextFragment, TextRecognizer,
};
use shelfscan::models::Detection;
use shelfscan::service::{
    DetectRequest, DetectStage, GroupRequest, GroupStage, VisualizeRequest, VisualizeStage,
};

/// Learned detector stand-in: returns its fixed boxes that score at least
/// the requested confidence.
pub struct FixedDetector {
    pub boxes: Vec<Detection>,
}

impl ObjectDetector for FixedDetector {
    fn predict(
        &self,
        _image: &RgbImage,
        confidence: f32,
        _nms_iou: f32,
    ) -> anyhow::Result<Vec<Detection>> {
        Ok(self
            .boxes
            .iter()
            .filter(|d| d.confidence() >= confidence)
            .cloned()
            .collect())
    }
}

/// Reads the text registered for the colour at the centre of the crop.
pub struct ColorTextRecognizer {
    pub labels: Vec<([u8; 3], &'static str)>,
}

impl TextRecognizer for ColorTextRecognizer {
    fn read(&self, crop: &RgbImage) -> anyhow::Result<Vec<TextFragment>> {
        let center = crop.get_pixel(crop.width() / 2, crop.height() / 2).0;
        Ok(self
            .labels
            .iter()
            .filter(|(color, _)| *color == center)
            .map(|(_, text)| TextFragment {
                text: text.to_string(),
                confidence: 0.9,
            })
            .collect())
    }
}

/// Mean colour of the crop.
pub struct MeanColorFeatures;

impl FeatureExtractor for MeanColorFeatures {
    fn features(&self, crop: &RgbImage) -> anyhow::Result<FeatureVector> {
        let n = (crop.width() * crop.height()).max(1) as f32;
        let mut sums = [0f32; 3];
        for p in crop.pixels() {
            for c in 0..3 {
                sums[c] += p[c] as f32;
            }
        }
        Ok(sums.iter().map(|s| s / n).collect())
    }
}

pub struct FailingFeatures;

impl FeatureExtractor for FailingFeatures {
    fn features(&self, _crop: &RgbImage) -> anyhow::Result<FeatureVector> {
        anyhow::bail!("model crashed")
    }
}

/// Cascade whose learned tiers are served by `boxes`.
pub fn stub_cascade(boxes: Vec<Detection>) -> CascadeDetector {
    stub_cascade_with(boxes, DetectionConfig::default())
}

pub fn stub_cascade_with(boxes: Vec<Detection>, config: DetectionConfig) -> CascadeDetector {
    CascadeDetector::new(
        Capability::Available(Box::new(FixedDetector { boxes })),
        FallbackDetector::new(FallbackConfig::default()),
        config,
    )
}

/// Cascade that trusts the learned detector alone, so the synthetic shelves
/// are never topped up by edge/template detection.
pub fn learned_only_cascade(boxes: Vec<Detection>) -> CascadeDetector {
    stub_cascade_with(
        boxes,
        DetectionConfig {
            secondary_trigger: 0,
            fallback_trigger: 0,
            ..DetectionConfig::default()
        },
    )
}

/// Grouping engine reading brand text from product colours.
pub fn stub_engine(labels: Vec<([u8; 3], &'static str)>) -> GroupingEngine {
    GroupingEngine::new(
        Capability::Available(Box::new(MeanColorFeatures)),
        Capability::Available(Box::new(ColorTextRecognizer { labels })),
        BrandTable::default(),
        GroupingConfig::default(),
    )
}

/// Grouping engine with no optional capabilities at all.
pub fn bare_engine() -> GroupingEngine {
    GroupingEngine::new(
        Capability::Unavailable("not loaded".to_string()),
        Capability::Unavailable("not loaded".to_string()),
        BrandTable::default(),
        GroupingConfig::default(),
    )
}

#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct MockDetect {
    pub result: Result<Vec<Detection>, CollaboratorError>,
    pub calls: CallCounter,
    pub healthy: bool,
}

impl MockDetect {
    pub fn returning(detections: Vec<Detection>) -> Self {
        Self {
            result: Ok(detections),
            calls: CallCounter::default(),
            healthy: true,
        }
    }

    pub fn failing(err: CollaboratorError) -> Self {
        Self {
            result: Err(err),
            calls: CallCounter::default(),
            healthy: true,
        }
    }
}

impl DetectStage for MockDetect {
    async fn detect(&self, _request: DetectRequest) -> Result<Vec<Detection>, CollaboratorError> {
        self.calls.hit();
        self.result.clone()
    }

    async fn healthy(&self) -> bool {
        self.healthy
    }
}

/// Grouping collaborator that puts everything in one group, optionally after
/// a delay, or hands back whatever `output` overrides it with.
pub struct MockGroup {
    pub delay: Option<Duration>,
    pub output: Option<Vec<Detection>>,
    pub calls: CallCounter,
    pub healthy: bool,
}

impl MockGroup {
    pub fn single_group() -> Self {
        Self {
            delay: None,
            output: None,
            calls: CallCounter::default(),
            healthy: true,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::single_group()
        }
    }
}

impl GroupStage for MockGroup {
    async fn group(&self, request: GroupRequest) -> Result<Vec<Detection>, CollaboratorError> {
        self.calls.hit();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        let label = shelfscan::models::GroupLabel::for_brand(0, "Mock");
        Ok(request
            .detections
            .into_iter()
            .map(|mut d| {
                d.assign_group(&label);
                d
            })
            .collect())
    }

    async fn healthy(&self) -> bool {
        self.healthy
    }
}

pub struct MockVisualize {
    pub calls: CallCounter,
    pub healthy: bool,
}

impl MockVisualize {
    pub fn new() -> Self {
        Self {
            calls: CallCounter::default(),
            healthy: true,
        }
    }
}

impl VisualizeStage for MockVisualize {
    async fn visualize(&self, _request: VisualizeRequest) -> Result<String, CollaboratorError> {
        self.calls.hit();
        Ok("static/results/mock.jpg".to_string())
    }

    async fn healthy(&self) -> bool {
        self.healthy
    }
}
