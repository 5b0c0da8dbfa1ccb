//! Request and response bodies exchanged with the stage collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CollaboratorError;
use crate::models::Detection;

/// Encoded image file bytes (PNG, JPEG, ...), sent as base64 text.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage(Arc<Vec<u8>>);

impl EncodedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode to an RGB pixel grid.
    pub fn decode(&self) -> anyhow::Result<RgbImage> {
        let image = image::load_from_memory(&self.0).context("Invalid image format")?;
        Ok(image.to_rgb8())
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedImage({} bytes)", self.0.len())
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.0.as_slice()))
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Self::new)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub image: EncodedImage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub success: bool,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRequest {
    pub image: EncodedImage,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResponse {
    pub success: bool,
    #[serde(default)]
    pub grouped_detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizeRequest {
    pub image: EncodedImage,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn rejected(error: Option<String>) -> CollaboratorError {
    CollaboratorError::Rejected(error.unwrap_or_else(|| "unknown error".to_string()))
}

impl DetectResponse {
    pub fn from_result(result: Result<Vec<Detection>, CollaboratorError>) -> Self {
        match result {
            Ok(detections) => Self {
                success: true,
                detections,
                error: None,
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            detections: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<Vec<Detection>, CollaboratorError> {
        if self.success {
            Ok(self.detections)
        } else {
            Err(rejected(self.error))
        }
    }
}

impl GroupResponse {
    pub fn from_result(result: Result<Vec<Detection>, CollaboratorError>) -> Self {
        match result {
            Ok(grouped_detections) => Self {
                success: true,
                grouped_detections,
                error: None,
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            grouped_detections: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<Vec<Detection>, CollaboratorError> {
        if self.success {
            Ok(self.grouped_detections)
        } else {
            Err(rejected(self.error))
        }
    }
}

impl VisualizeResponse {
    pub fn from_result(result: Result<String, CollaboratorError>) -> Self {
        match result {
            Ok(result_image) => Self {
                success: true,
                result_image: Some(result_image),
                error: None,
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result_image: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<String, CollaboratorError> {
        match (self.success, self.result_image) {
            (true, Some(result_image)) => Ok(result_image),
            (true, None) => Err(CollaboratorError::Rejected(
                "no result image in response".to_string(),
            )),
            (false, _) => Err(rejected(self.error)),
        }
    }
}

/// Liveness probe reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    /// Optional capabilities (stage services) or collaborator health (orchestrator).
    #[serde(default)]
    pub checks: BTreeMap<String, bool>,
}

impl HealthResponse {
    pub fn new(service: &str, healthy: bool, checks: BTreeMap<String, bool>) -> Self {
        Self {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            service: service.to_string(),
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Top-level reply of one pipeline run.
///
/// On success every field but `error` is set; on failure only `success`
/// and `error` are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_count: Option<usize>,
    /// Seconds, rounded to two decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    /// Group id to member count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<usize, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
