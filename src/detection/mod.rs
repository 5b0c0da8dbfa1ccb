pub mod contours;
pub mod fallback;
pub mod preprocessing;
pub mod templates;
pub mod yolo;

use image::RgbImage;

use crate::capability::Capability;
use crate::config::{DetectionConfig, FallbackConfig};
use crate::geometry::admit_novel;
use crate::models::Detection;

pub use fallback::FallbackDetector;
pub use yolo::YoloDetector;

/// Learned object detector used by the first two cascade tiers.
pub trait ObjectDetector: Send + Sync {
    /// Boxes scoring at least `confidence`, after the provider's own
    /// non-maximum suppression at `nms_iou`.
    fn predict(&self, image: &RgbImage, confidence: f32, nms_iou: f32)
    -> anyhow::Result<Vec<Detection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Secondary,
    Fallback,
}

/// What one tier contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierReport {
    pub tier: Tier,
    /// Candidates left after the size filter.
    pub candidates: usize,
    pub admitted: usize,
}

#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub detections: Vec<Detection>,
    pub tiers: Vec<TierReport>,
}

impl CascadeReport {
    pub fn ran(&self, tier: Tier) -> bool {
        self.tiers.iter().any(|t| t.tier == tier)
    }
}

/// Three-tier product detector.
///
/// 1. learned detector at normal sensitivity, everything kept;
/// 2. if too few were found, again at near-zero confidence, admitting only
///    boxes that do not overlap anything already accepted;
/// 3. if still too few, the edge/template detector under the same rule.
///
/// Without a learned detector the edge/template detector runs alone.
pub struct CascadeDetector {
    primary: Capability<Box<dyn ObjectDetector>>,
    fallback: FallbackDetector,
    config: DetectionConfig,
}

impl CascadeDetector {
    pub fn new(
        primary: Capability<Box<dyn ObjectDetector>>,
        fallback: FallbackDetector,
        config: DetectionConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
        }
    }

    /// Load the learned detector named in the config, if any.
    pub fn from_config(detection: &DetectionConfig, fallback: &FallbackConfig) -> Self {
        let primary = match &detection.model_path {
            Some(path) => Capability::load(
                "object detection model",
                YoloDetector::load(path, detection.input_size)
                    .map(|d| Box::new(d) as Box<dyn ObjectDetector>),
            ),
            None => Capability::Unavailable("no detection model configured".to_string()),
        };
        Self::new(primary, FallbackDetector::new(fallback.clone()), detection.clone())
    }

    pub fn primary_available(&self) -> bool {
        self.primary.is_available()
    }

    pub fn detect(&self, image: &RgbImage) -> Vec<Detection> {
        self.detect_with_report(image).detections
    }

    pub fn detect_with_report(&self, image: &RgbImage) -> CascadeReport {
        let Some(primary) = self.primary.get() else {
            tracing::info!("no learned detector, using edge/template detection");
            return self.fallback_only(image);
        };

        let cfg = &self.config;
        let mut tiers = Vec::new();

        let mut accepted = match primary.predict(image, cfg.primary_confidence, cfg.primary_nms_iou) {
            Ok(found) => min_size(found, cfg.primary_min_size),
            Err(e) => {
                tracing::warn!("learned detector failed, using edge/template detection: {e:#}");
                return self.fallback_only(image);
            }
        };
        tiers.push(TierReport {
            tier: Tier::Primary,
            candidates: accepted.len(),
            admitted: accepted.len(),
        });
        tracing::debug!(accepted = accepted.len(), "primary pass");

        if accepted.len() < cfg.secondary_trigger {
            tracing::debug!("few detections found, trying ultra-low confidence");
            match primary.predict(image, cfg.secondary_confidence, cfg.secondary_nms_iou) {
                Ok(found) => {
                    let candidates = min_size(found, cfg.secondary_min_size);
                    let count = candidates.len();
                    let admitted = admit_novel(&mut accepted, candidates, cfg.dedup_iou);
                    tiers.push(TierReport {
                        tier: Tier::Secondary,
                        candidates: count,
                        admitted,
                    });
                    tracing::debug!(candidates = count, admitted, "secondary pass");
                }
                Err(e) => tracing::warn!("low-confidence pass failed: {e:#}"),
            }
        }

        if accepted.len() < cfg.fallback_trigger {
            tracing::debug!("still too few detections, adding edge/template detection");
            let candidates = self.fallback.detect(image);
            let count = candidates.len();
            let admitted = admit_novel(&mut accepted, candidates, cfg.dedup_iou);
            tiers.push(TierReport {
                tier: Tier::Fallback,
                candidates: count,
                admitted,
            });
            tracing::debug!(candidates = count, admitted, "fallback pass");
        }

        tracing::info!("total detections found: {}", accepted.len());
        CascadeReport {
            detections: accepted,
            tiers,
        }
    }

    fn fallback_only(&self, image: &RgbImage) -> CascadeReport {
        let detections = self.fallback.detect(image);
        tracing::info!("edge/template detection found {} products", detections.len());
        CascadeReport {
            tiers: vec![TierReport {
                tier: Tier::Fallback,
                candidates: detections.len(),
                admitted: detections.len(),
            }],
            detections,
        }
    }
}

/// Drop boxes that are not strictly larger than `min` pixels in both dimensions.
fn min_size(detections: Vec<Detection>, min: i32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.bbox().width() > min && d.bbox().height() > min)
        .collect()
}
