use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::models::{Detection, summarize_groups};

const GROUP_COLORS: [[u8; 3]; 8] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 165, 0],
    [128, 0, 128],
];

const BOX_THICKNESS: i32 = 3;
const SWATCH: u32 = 16;

pub fn group_color(group_id: usize) -> Rgb<u8> {
    Rgb(GROUP_COLORS[group_id % GROUP_COLORS.len()])
}

/// Draws grouped detections onto a copy of the image and stores the result.
#[derive(Debug, Clone)]
pub struct Visualizer {
    results_dir: PathBuf,
}

impl Visualizer {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Box outline per detection in its group colour, plus one legend swatch
    /// per group along the top-left edge.
    pub fn render(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();

        for det in detections {
            let color = group_color(det.group_id().unwrap_or(0));
            let b = det.bbox();
            for inset in 0..BOX_THICKNESS {
                let w = b.width() - 2 * inset;
                let h = b.height() - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(b.x1() + inset, b.y1() + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }

        for (row, group) in summarize_groups(detections).iter().enumerate() {
            let y = 4 + row as i32 * (SWATCH as i32 + 4);
            let rect = Rect::at(4, y).of_size(SWATCH, SWATCH);
            draw_filled_rect_mut(&mut canvas, rect, group_color(group.group_id));
        }

        canvas
    }

    /// Render and write `result_<uuid>.jpg` into the results directory.
    pub fn render_to_file(&self, image: &RgbImage, detections: &[Detection]) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.results_dir).with_context(|| {
            format!("failed to create results directory {}", self.results_dir.display())
        })?;

        let rendered = self.render(image, detections);
        let path = self
            .results_dir
            .join(format!("result_{}.jpg", uuid::Uuid::new_v4()));
        rendered
            .save(&path)
            .map_err(|e| anyhow::anyhow!("Failed to save result image: {}", e))?;

        tracing::info!("visualization saved: {}", path.display());
        Ok(path)
    }
}
