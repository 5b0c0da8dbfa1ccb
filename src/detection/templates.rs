use image::{GrayImage, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

use crate::config::TemplateSpec;
use crate::geometry::is_novel;
use crate::models::{BoundingBox, Detection};

/// A product silhouette: a solid body inset by `margin` pixels of background
/// on every side. Only the body/margin split is stored; the pixel values
/// cancel out of a mean-centred correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Silhouette {
    width: u32,
    height: u32,
    margin: u32,
}

impl Silhouette {
    fn new(width: u32, height: u32) -> Option<Self> {
        let margin = (width.min(height) / 8).max(2);
        // no margin left means a flat template, which correlates with nothing
        (width > 2 * margin && height > 2 * margin).then_some(Self {
            width,
            height,
            margin,
        })
    }

    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn body_area(&self) -> u64 {
        (self.width - 2 * self.margin) as u64 * (self.height - 2 * self.margin) as u64
    }
}

/// Window sums over a grayscale image in constant time per window.
struct WindowSums {
    sum: image::ImageBuffer<Luma<u64>, Vec<u64>>,
    squares: image::ImageBuffer<Luma<u64>, Vec<u64>>,
}

impl WindowSums {
    fn new(gray: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(gray),
            squares: integral_squared_image::<_, u64>(gray),
        }
    }

    /// Sum and sum of squares of the `w`x`h` window at (x, y).
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (u64, u64) {
        let (right, bottom) = (x + w - 1, y + h - 1);
        (
            sum_image_pixels(&self.sum, x, y, right, bottom)[0],
            sum_image_pixels(&self.squares, x, y, right, bottom)[0],
        )
    }
}

/// Mean-centred normalised correlation between the window at (x, y) and the
/// silhouette, in [-1, 1]. Zero when the window is flat.
///
/// With the body at 1 and the margin at 0, the template terms reduce to the
/// body area, so every sum comes from the integral images.
fn correlation(sums: &WindowSums, shape: &Silhouette, x: u32, y: u32) -> f32 {
    let n = shape.area() as i128;
    let m = shape.body_area() as i128;
    let (window_sum, window_squares) = sums.window(x, y, shape.width, shape.height);
    let (body_sum, _) = sums.window(
        x + shape.margin,
        y + shape.margin,
        shape.width - 2 * shape.margin,
        shape.height - 2 * shape.margin,
    );

    let (s, ss) = (window_sum as i128, window_squares as i128);
    let window_var = n * ss - s * s;
    let template_var = m * (n - m);
    if window_var <= 0 || template_var <= 0 {
        return 0.0;
    }
    let covariance = n * body_sum as i128 - s * m;
    (covariance as f64 / ((window_var as f64).sqrt() * (template_var as f64).sqrt())) as f32
}

/// Slide each silhouette template over `gray` and admit every match above
/// the template's threshold whose overlap with all boxes found so far
/// (`found`, extended as matches are admitted) stays below `dedup_iou`.
///
/// Scores are mean-centred, so flat regions never match. The magnitude is
/// compared, which finds dark products on light shelves as well as light on
/// dark.
///
/// Returns the number of matches admitted.
pub fn match_product_templates(
    gray: &GrayImage,
    templates: &[TemplateSpec],
    confidence: f32,
    dedup_iou: f32,
    found: &mut Vec<Detection>,
) -> usize {
    if gray.width() == 0 || gray.height() == 0 {
        return 0;
    }
    let sums = WindowSums::new(gray);
    let mut admitted = 0;

    for spec in templates {
        if spec.width > gray.width() || spec.height > gray.height() {
            continue;
        }
        let Some(shape) = Silhouette::new(spec.width, spec.height) else {
            continue;
        };

        // row-major scan
        for y in 0..=gray.height() - shape.height {
            for x in 0..=gray.width() - shape.width {
                let score = correlation(&sums, &shape, x, y).abs();
                if score < spec.threshold {
                    continue;
                }
                let Some(bbox) = BoundingBox::from_xywh(
                    x as i32,
                    y as i32,
                    shape.width as i32,
                    shape.height as i32,
                ) else {
                    continue;
                };
                if is_novel(&bbox, found, dedup_iou) {
                    found.push(Detection::new(bbox, confidence));
                    admitted += 1;
                }
            }
        }
    }

    admitted
}
