pub mod brands;
pub mod colors;
pub mod dbscan;
pub mod features;
pub mod ocr;

use image::RgbImage;

use crate::capability::Capability;
use crate::config::{GroupingConfig, GroupingMode};
use crate::error::GroupingError;
use crate::models::{BoundingBox, Detection, GroupLabel};

pub use brands::{BrandEntry, BrandMatch, BrandTable};
pub use features::{EmbeddingExtractor, FeatureExtractor, FeatureVector, simple_features};
pub use ocr::{OcrsRecognizer, TextRecognizer};

/// Brand label used when no brand could be read.
pub const UNKNOWN_BRAND: &str = "Unknown Brand";

/// One piece of text read off a crop.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub confidence: f32,
}

/// Groups detections by recognised brand text, then clusters whatever is
/// left by visual similarity. In [`GroupingMode::Fast`] it clusters by
/// dominant colour only.
pub struct GroupingEngine {
    features: Capability<Box<dyn FeatureExtractor>>,
    text: Capability<Box<dyn TextRecognizer>>,
    brands: BrandTable,
    config: GroupingConfig,
}

impl GroupingEngine {
    pub fn new(
        features: Capability<Box<dyn FeatureExtractor>>,
        text: Capability<Box<dyn TextRecognizer>>,
        brands: BrandTable,
        config: GroupingConfig,
    ) -> Self {
        Self {
            features,
            text,
            brands,
            config,
        }
    }

    /// Load the feature model and OCR engine named in the config. Anything
    /// that fails to load is replaced by its fallback. Fast mode loads
    /// nothing.
    pub fn from_config(config: &GroupingConfig) -> Self {
        if config.mode == GroupingMode::Fast {
            return Self::new(
                Capability::Unavailable("not used in fast mode".to_string()),
                Capability::Unavailable("not used in fast mode".to_string()),
                BrandTable::default(),
                config.clone(),
            );
        }
        let features = match &config.feature_model_path {
            Some(path) => Capability::load(
                "feature model",
                EmbeddingExtractor::load(path).map(|e| Box::new(e) as Box<dyn FeatureExtractor>),
            ),
            None => Capability::Unavailable("no feature model configured".to_string()),
        };
        let text = if config.ocr_enabled {
            Capability::load(
                "OCR engine",
                OcrsRecognizer::load(config.ocr_model_dir.as_deref())
                    .map(|r| Box::new(r) as Box<dyn TextRecognizer>),
            )
        } else {
            Capability::Unavailable("OCR disabled".to_string())
        };
        Self::new(features, text, BrandTable::default(), config.clone())
    }

    pub fn feature_model_available(&self) -> bool {
        self.features.is_available()
    }

    pub fn text_recognition_available(&self) -> bool {
        self.text.is_available()
    }

    pub fn mode(&self) -> GroupingMode {
        self.config.mode
    }

    /// Assign a group to every detection.
    ///
    /// Group ids are dense from 0: brand groups first in the order their
    /// brand was first seen, then visual clusters, then unclustered products
    /// as singleton groups.
    pub fn group(
        &self,
        image: &RgbImage,
        mut detections: Vec<Detection>,
    ) -> Result<Vec<Detection>, GroupingError> {
        if self.config.mode == GroupingMode::Fast {
            return colors::group_by_color(image, detections, self.config.max_color_groups);
        }
        if detections.is_empty() {
            return Err(GroupingError::MissingInput);
        }

        let crops: Vec<RgbImage> = detections
            .iter()
            .map(|d| crop_detection(image, d.bbox()))
            .collect();

        if detections.len() == 1 {
            // nothing to cluster against
            let label = match self.brand_evidence(&crops[0]) {
                Some(found) => GroupLabel::for_brand(0, found.brand),
                None => GroupLabel {
                    id: 0,
                    brand_name: UNKNOWN_BRAND.to_string(),
                    group_name: "Product Group 1".to_string(),
                },
            };
            detections[0].assign_group(&label);
            return Ok(detections);
        }

        let mut brand_groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut deferred = Vec::new();
        for (i, crop) in crops.iter().enumerate() {
            match self.brand_evidence(crop) {
                Some(found) => {
                    tracing::debug!("product {}: brand = {}", i + 1, found.brand);
                    match brand_groups.iter_mut().find(|(brand, _)| *brand == found.brand) {
                        Some((_, members)) => members.push(i),
                        None => brand_groups.push((found.brand, vec![i])),
                    }
                }
                None => {
                    tracing::debug!("product {}: no brand", i + 1);
                    deferred.push(i);
                }
            }
        }

        let deferred_crops: Vec<&RgbImage> = deferred.iter().map(|&i| &crops[i]).collect();
        let visual_groups = self.cluster_by_appearance(&deferred_crops);

        let mut labels: Vec<(GroupLabel, Vec<usize>)> = Vec::new();
        for (brand, members) in brand_groups {
            labels.push((GroupLabel::for_brand(labels.len(), brand), members));
        }
        for (n, members) in visual_groups.into_iter().enumerate() {
            let brand = format!("Visual Group {}", n + 1);
            let members = members.into_iter().map(|k| deferred[k]).collect();
            labels.push((GroupLabel::for_brand(labels.len(), brand), members));
        }

        for (label, members) in &labels {
            for &i in members {
                detections[i].assign_group(label);
            }
        }

        tracing::info!(
            "grouped {} products into {} groups",
            detections.len(),
            labels.len()
        );
        Ok(detections)
    }

    /// Best brand read off a crop, `None` when nothing in the table matched or
    /// no text recognizer is available.
    fn brand_evidence(&self, crop: &RgbImage) -> Option<BrandMatch> {
        let recognizer = self.text.get()?;
        if crop.width() == 0 || crop.height() == 0 {
            return None;
        }
        match recognizer.read(crop) {
            Ok(fragments) => self
                .brands
                .match_fragments(&fragments, self.config.min_text_confidence),
            Err(e) => {
                tracing::warn!("OCR failed: {e:#}");
                None
            }
        }
    }

    /// Cluster crops by appearance. Returns groups of indices into `crops`:
    /// the density clusters in label order, then each unclustered crop alone.
    fn cluster_by_appearance(&self, crops: &[&RgbImage]) -> Vec<Vec<usize>> {
        if crops.is_empty() {
            return Vec::new();
        }

        let features = self.appearance_features(crops);
        let standardized = dbscan::standardize(&features);
        let labels = dbscan::dbscan(&standardized, self.config.eps, self.config.min_samples);

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut noise = Vec::new();
        for (i, label) in labels.into_iter().enumerate() {
            match label {
                Some(l) => {
                    if clusters.len() <= l {
                        clusters.resize_with(l + 1, Vec::new);
                    }
                    clusters[l].push(i);
                }
                None => noise.push(vec![i]),
            }
        }

        tracing::debug!(
            clusters = clusters.len(),
            unclustered = noise.len(),
            "visual clustering"
        );
        clusters.extend(noise);
        clusters
    }

    /// Feature vectors for all crops from one source: the learned extractor
    /// when it works for every crop, colour/edge statistics otherwise.
    fn appearance_features(&self, crops: &[&RgbImage]) -> Vec<FeatureVector> {
        if let Some(extractor) = self.features.get() {
            let learned: anyhow::Result<Vec<FeatureVector>> =
                crops.iter().map(|crop| extractor.features(crop)).collect();
            match learned {
                Ok(features) if same_length(&features) => return features,
                Ok(_) => tracing::warn!("feature model returned vectors of different lengths"),
                Err(e) => tracing::warn!("feature extraction failed: {e:#}"),
            }
        }
        crops.iter().map(|crop| simple_features(crop)).collect()
    }
}

fn same_length(features: &[FeatureVector]) -> bool {
    features.windows(2).all(|w| w[0].len() == w[1].len())
}

/// The part of `image` under `bbox`, clipped to the image; empty if nothing is left.
pub fn crop_detection(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    match bbox.clamp_to(image.width(), image.height()) {
        Some(b) => image::imageops::crop_imm(
            image,
            b.x1() as u32,
            b.y1() as u32,
            b.width() as u32,
            b.height() as u32,
        )
        .to_image(),
        None => RgbImage::new(0, 0),
    }
}
