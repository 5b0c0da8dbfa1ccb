use std::path::{Path, PathBuf};

use image::RgbImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;

use crate::grouping::TextFragment;

/// Reads text off a product crop.
pub trait TextRecognizer: Send + Sync {
    fn read(&self, crop: &RgbImage) -> anyhow::Result<Vec<TextFragment>>;
}

/// ocrs does not score recognised lines; every line gets this confidence.
const LINE_CONFIDENCE: f32 = 0.9;

/// Default model location used by `ocrs-cli`.
pub fn default_model_dir() -> anyhow::Result<PathBuf> {
    let home_dir = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
    Ok(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Initialize OCR engine with the detection and recognition models in `model_dir`
pub fn init_ocr_engine(model_dir: &Path) -> anyhow::Result<OcrEngine> {
    let detection_model_path = model_dir.join("text-detection.rten");
    let recognition_model_path = model_dir.join("text-recognition.rten");

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        anyhow::bail!(
            "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
             Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        );
    }

    let detection_model = Model::load_file(&detection_model_path)?;
    let recognition_model = Model::load_file(&recognition_model_path)?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })?;

    Ok(engine)
}

/// Text recognizer backed by the ocrs engine, one fragment per text line.
pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl OcrsRecognizer {
    pub fn new(engine: OcrEngine) -> Self {
        Self { engine }
    }

    pub fn load(model_dir: Option<&Path>) -> anyhow::Result<Self> {
        let dir = match model_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_model_dir()?,
        };
        Ok(Self::new(init_ocr_engine(&dir)?))
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn read(&self, crop: &RgbImage) -> anyhow::Result<Vec<TextFragment>> {
        let img_source = ImageSource::from_bytes(crop.as_raw(), crop.dimensions())?;
        let ocr_input = self.engine.prepare_input(img_source)?;

        let word_rects = self.engine.detect_words(&ocr_input)?;
        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);
        let lines = self.engine.recognize_text(&ocr_input, &line_rects)?;

        Ok(lines
            .iter()
            .flatten()
            .map(|line| line.to_string().trim().to_string())
            .filter(|text| !text.is_empty())
            .map(|text| TextFragment {
                text,
                confidence: LINE_CONFIDENCE,
            })
            .collect())
    }
}
