use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration, read from an optional TOML file.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub fallback: FallbackConfig,
    pub grouping: GroupingConfig,
    pub services: ServicesConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

/// Thresholds for the learned-detector tiers of the cascade.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// `.rten` object detection model; no model means edge/template detection only.
    pub model_path: Option<PathBuf>,
    /// Square input size expected by the model.
    pub input_size: u32,
    pub primary_confidence: f32,
    pub primary_nms_iou: f32,
    pub primary_min_size: i32,
    pub secondary_confidence: f32,
    pub secondary_nms_iou: f32,
    pub secondary_min_size: i32,
    /// Secondary pass runs when the primary accepted fewer than this.
    pub secondary_trigger: usize,
    /// Fallback pass runs when fewer than this were accepted after the secondary.
    pub fallback_trigger: usize,
    pub dedup_iou: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 640,
            primary_confidence: 0.10,
            primary_nms_iou: 0.3,
            primary_min_size: 20,
            secondary_confidence: 0.05,
            secondary_nms_iou: 0.2,
            secondary_min_size: 15,
            secondary_trigger: 5,
            fallback_trigger: 3,
            dedup_iou: crate::geometry::DEDUP_IOU,
        }
    }
}

/// Product-sized window slid over the grayscale image. The template is a
/// solid body inside a thin background margin.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    pub width: u32,
    pub height: u32,
    pub threshold: f32,
}

/// Parameters of the non-learned edge/contour + template detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Contours must be strictly larger than this in both dimensions.
    pub min_size: u32,
    /// Contours must be smaller than this fraction of the image in each dimension.
    pub max_image_fraction: f32,
    /// Minimum contour area / bounding box area.
    pub min_fill_ratio: f32,
    pub contour_confidence: f32,
    pub template_confidence: f32,
    pub templates: Vec<TemplateSpec>,
    pub dedup_iou: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            min_size: 25,
            max_image_fraction: 0.9,
            min_fill_ratio: 0.3,
            contour_confidence: 0.6,
            template_confidence: 0.5,
            templates: vec![
                // tall/narrow: bottles, boxes
                TemplateSpec { width: 30, height: 60, threshold: 0.4 },
                // wide/short: packs
                TemplateSpec { width: 80, height: 40, threshold: 0.4 },
                // square: small products
                TemplateSpec { width: 50, height: 50, threshold: 0.3 },
            ],
            dedup_iou: crate::geometry::DEDUP_IOU,
        }
    }
}

/// Which grouping algorithm the grouping stage runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    /// Brand text first, then density clustering of appearance features.
    #[default]
    Full,
    /// Dominant-colour k-means only; no models are loaded.
    Fast,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub mode: GroupingMode,
    /// DBSCAN neighbourhood radius in standardised feature space.
    pub eps: f32,
    /// DBSCAN minimum neighbourhood size, the point itself included.
    pub min_samples: usize,
    /// OCR fragments at or below this confidence are ignored.
    pub min_text_confidence: f32,
    /// `.rten` image embedding model; no model means colour/edge statistics.
    pub feature_model_path: Option<PathBuf>,
    pub ocr_enabled: bool,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`,
    /// `~/.cache/ocrs` when unset.
    pub ocr_model_dir: Option<PathBuf>,
    /// Upper bound on colour groups in fast mode.
    pub max_color_groups: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            mode: GroupingMode::Full,
            eps: 0.5,
            min_samples: 2,
            min_text_confidence: 0.3,
            feature_model_path: None,
            ocr_enabled: true,
            ocr_model_dir: None,
            max_color_groups: 5,
        }
    }
}

/// Connection and completion budget for one kind of collaborator call.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StageTimeout {
    pub connect_secs: f64,
    pub total_secs: f64,
}

impl StageTimeout {
    pub const fn new(connect_secs: f64, total_secs: f64) -> Self {
        Self {
            connect_secs,
            total_secs,
        }
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs_f64(self.connect_secs)
    }

    pub fn total(&self) -> Duration {
        Duration::from_secs_f64(self.total_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub detect: StageTimeout,
    pub group: StageTimeout,
    pub visualize: StageTimeout,
    pub health: StageTimeout,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            detect: StageTimeout::new(10.0, 60.0),
            // feature and text extraction is the slowest stage
            group: StageTimeout::new(30.0, 180.0),
            visualize: StageTimeout::new(10.0, 60.0),
            health: StageTimeout::new(5.0, 5.0),
        }
    }
}

/// Where the stage collaborators live when they run as separate services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub detect_url: String,
    pub group_url: String,
    pub visualize_url: String,
    pub timeouts: StageTimeouts,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            detect_url: "http://localhost:5001".to_string(),
            group_url: "http://localhost:5002".to_string(),
            visualize_url: "http://localhost:5003".to_string(),
            timeouts: StageTimeouts::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("static/results"),
        }
    }
}
