use image::RgbImage;

use crate::config::FallbackConfig;
use crate::detection::{contours, preprocessing, templates};
use crate::models::Detection;

/// Product detector that needs no learned model: edge contours plus template
/// matching. Used alone when no model is loaded and as the last cascade tier.
#[derive(Debug, Clone, Default)]
pub struct FallbackDetector {
    pub config: FallbackConfig,
}

impl FallbackDetector {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, image: &RgbImage) -> Vec<Detection> {
        let gray = preprocessing::to_grayscale(image);
        let edges = preprocessing::product_edges(&gray);
        let found_contours = contours::find_outer_contours(&edges);

        let mut detections =
            contours::contour_candidates(&found_contours, image.width(), image.height(), &self.config);
        let from_contours = detections.len();

        let from_templates = templates::match_product_templates(
            &gray,
            &self.config.templates,
            self.config.template_confidence,
            self.config.dedup_iou,
            &mut detections,
        );

        tracing::debug!(
            contours = found_contours.len(),
            from_contours,
            from_templates,
            "edge/template detection finished"
        );

        detections
    }
}
