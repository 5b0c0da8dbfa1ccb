use std::path::Path;

use anyhow::Context;
use image::RgbImage;
use image::imageops::FilterType;
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};

use crate::detection::preprocessing;

/// Fixed-length appearance summary of one product crop.
pub type FeatureVector = Vec<f32>;

/// Learned appearance embedding of a product crop.
pub trait FeatureExtractor: Send + Sync {
    fn features(&self, crop: &RgbImage) -> anyhow::Result<FeatureVector>;
}

/// Coarse colour/edge statistics: mean red, green and blue, plus Canny edge
/// density (mean edge-map intensity). Needs no model.
pub fn simple_features(crop: &RgbImage) -> FeatureVector {
    let pixels = (crop.width() as u64 * crop.height() as u64) as f32;
    if pixels == 0.0 {
        return vec![0.0; 4];
    }

    let mut sums = [0u64; 3];
    for pixel in crop.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += channel as u64;
        }
    }

    let gray = preprocessing::to_grayscale(crop);
    let edges = preprocessing::detect_edges(&gray, 50.0, 150.0);
    let edge_sum: u64 = edges.pixels().map(|p| p[0] as u64).sum();

    vec![
        sums[0] as f32 / pixels,
        sums[1] as f32 / pixels,
        sums[2] as f32 / pixels,
        edge_sum as f32 / pixels,
    ]
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Image classification backbone exported to `.rten`, used as an embedding.
///
/// Crops are resized so the short side is 128, centre-cropped to 112 and
/// normalised with the ImageNet statistics; the flattened output is the
/// feature vector.
pub struct EmbeddingExtractor {
    model: Model,
    resize: u32,
    crop: u32,
}

impl EmbeddingExtractor {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        let model = Model::load_file(model_path)
            .with_context(|| format!("failed to load feature model {}", model_path.display()))?;
        Ok(Self {
            model,
            resize: 128,
            crop: 112,
        })
    }

    fn preprocess(&self, crop: &RgbImage) -> anyhow::Result<NdTensor<f32, 4>> {
        let (w, h) = crop.dimensions();
        if w == 0 || h == 0 {
            anyhow::bail!("empty crop");
        }

        let scale = self.resize as f32 / w.min(h) as f32;
        let new_w = ((w as f32 * scale).round() as u32).max(self.crop);
        let new_h = ((h as f32 * scale).round() as u32).max(self.crop);
        let resized = image::imageops::resize(crop, new_w, new_h, FilterType::Triangle);

        let left = (new_w - self.crop) / 2;
        let top = (new_h - self.crop) / 2;
        let centred =
            image::imageops::crop_imm(&resized, left, top, self.crop, self.crop).to_image();

        let s = self.crop as usize;
        let mut input = NdTensor::zeros([1, 3, s, s]);
        for (x, y, pixel) in centred.enumerate_pixels() {
            for c in 0..3 {
                let v = pixel[c] as f32 / 255.0;
                input[[0, c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
        Ok(input)
    }
}

impl FeatureExtractor for EmbeddingExtractor {
    fn features(&self, crop: &RgbImage) -> anyhow::Result<FeatureVector> {
        let input = self.preprocess(crop)?;
        let output = self
            .model
            .run_one(input.view().into(), None)
            .context("feature model inference failed")?;
        let output: Tensor<f32> = output
            .try_into()
            .map_err(|e| anyhow::anyhow!("unexpected feature model output: {e:?}"))?;
        Ok(output.iter().copied().collect())
    }
}
