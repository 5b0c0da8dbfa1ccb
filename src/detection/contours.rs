use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;

use crate::config::FallbackConfig;
use crate::models::{Contour, Detection};

/// Find the outermost contours of a binary edge image.
pub fn find_outer_contours(edges: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| contour_from_points(&c.points))
        .collect()
}

fn contour_from_points(points: &[Point<i32>]) -> Option<Contour> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    Some(Contour {
        min_x: min_x.max(0) as u32,
        min_y: min_y.max(0) as u32,
        max_x: max_x.max(0) as u32,
        max_y: max_y.max(0) as u32,
        area: polygon_area(points),
    })
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area: i64 = 0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice_area.abs() as f32 / 2.0
}

/// Keep contours that look like a product silhouette and turn them into detections.
pub fn contour_candidates(
    contours: &[Contour],
    image_width: u32,
    image_height: u32,
    config: &FallbackConfig,
) -> Vec<Detection> {
    let max_w = image_width as f32 * config.max_image_fraction;
    let max_h = image_height as f32 * config.max_image_fraction;

    contours
        .iter()
        .filter(|c| {
            c.width() > config.min_size
                && c.height() > config.min_size
                && (c.width() as f32) < max_w
                && (c.height() as f32) < max_h
                // thin or sparse outlines do not fill their box
                && c.fill_ratio() > config.min_fill_ratio
        })
        .filter_map(|c| c.bbox())
        .map(|bbox| Detection::new(bbox, config.contour_confidence))
        .collect()
}
