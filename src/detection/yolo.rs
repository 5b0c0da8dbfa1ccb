use std::path::Path;

use anyhow::Context;
use image::RgbImage;
use image::imageops::FilterType;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

use crate::detection::ObjectDetector;
use crate::geometry::overlap_ratio;
use crate::models::{BoundingBox, Detection};

/// One decoded box before non-maximum suppression.
#[derive(Debug, Clone)]
struct RawBox {
    bbox: BoundingBox,
    score: f32,
    class_id: usize,
}

/// YOLOv8-style detector exported to `.rten`.
///
/// Expects a `[1, 3, S, S]` input in `[0, 1]` and a `[1, 4 + classes, boxes]`
/// output whose first four rows are centre x, centre y, width and height in
/// input pixels.
pub struct YoloDetector {
    model: Model,
    input_size: u32,
}

impl YoloDetector {
    pub fn load(model_path: &Path, input_size: u32) -> anyhow::Result<Self> {
        let model = Model::load_file(model_path)
            .with_context(|| format!("failed to load detection model {}", model_path.display()))?;
        Ok(Self { model, input_size })
    }

    /// Resize to the model input and convert to NCHW floats.
    fn preprocess(&self, image: &RgbImage) -> NdTensor<f32, 4> {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let s = size as usize;
        let mut input = NdTensor::zeros([1, 3, s, s]);
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        input
    }

    fn postprocess(
        &self,
        output: &NdTensor<f32, 3>,
        image_width: u32,
        image_height: u32,
        confidence: f32,
    ) -> anyhow::Result<Vec<RawBox>> {
        let [_batch, attrs, num_boxes] = output.shape();
        if attrs < 5 {
            anyhow::bail!("unexpected detector output shape {:?}", output.shape());
        }

        let scale_x = image_width as f32 / self.input_size as f32;
        let scale_y = image_height as f32 / self.input_size as f32;

        let mut boxes = Vec::new();
        for b in 0..num_boxes {
            let mut score = 0.0f32;
            let mut class_id = 0usize;
            for class in 0..attrs - 4 {
                let s = output[[0, 4 + class, b]];
                if s > score {
                    score = s;
                    class_id = class;
                }
            }
            if score < confidence {
                continue;
            }

            let cx = output[[0, 0, b]];
            let cy = output[[0, 1, b]];
            let w = output[[0, 2, b]];
            let h = output[[0, 3, b]];

            let x1 = ((cx - w / 2.0) * scale_x).round() as i32;
            let y1 = ((cy - h / 2.0) * scale_y).round() as i32;
            let x2 = ((cx + w / 2.0) * scale_x).round() as i32;
            let y2 = ((cy + h / 2.0) * scale_y).round() as i32;

            let bbox = BoundingBox::new(x1, y1, x2, y2)
                .and_then(|b| b.clamp_to(image_width, image_height));
            if let Some(bbox) = bbox {
                boxes.push(RawBox {
                    bbox,
                    score,
                    class_id,
                });
            }
        }

        Ok(boxes)
    }
}

/// Per-class non-maximum suppression, highest score first.
fn nms(mut boxes: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && overlap_ratio(&k.bbox, &candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

impl ObjectDetector for YoloDetector {
    fn predict(
        &self,
        image: &RgbImage,
        confidence: f32,
        nms_iou: f32,
    ) -> anyhow::Result<Vec<Detection>> {
        let input = self.preprocess(image);
        let output = self
            .model
            .run_one(input.view().into(), None)
            .context("detection model inference failed")?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| anyhow::anyhow!("unexpected detection model output: {e:?}"))?;

        let boxes = self.postprocess(&output, image.width(), image.height(), confidence)?;
        Ok(nms(boxes, nms_iou)
            .into_iter()
            .map(|b| Detection::new(b.bbox, b.score))
            .collect())
    }
}
