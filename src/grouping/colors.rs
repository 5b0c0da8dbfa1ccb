use image::RgbImage;

use crate::error::GroupingError;
use crate::models::{Detection, GroupLabel};

use super::crop_detection;

pub type Color = [f32; 3];

/// Stand-in for crops with no pixels.
const NEUTRAL_GRAY: Color = [128.0, 128.0, 128.0];
/// Colours looked for inside one crop.
const CROP_CLUSTERS: usize = 3;
/// Pixels sampled per crop, at most.
const MAX_SAMPLES: usize = 4096;
const MAX_ITERATIONS: usize = 50;

fn distance2(a: &Color, b: &Color) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &Color, centers: &[Color]) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = distance2(point, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Farthest-point seeding: the first point, then repeatedly the point
/// farthest from every chosen centre. Stops early once all points coincide
/// with a centre, so `k` is an upper bound.
fn seed_centers(points: &[Color], k: usize) -> Vec<Color> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let mut centers = vec![*first];
    while centers.len() < k {
        let farthest = points
            .iter()
            .map(|p| (p, centers.iter().map(|c| distance2(p, c)).fold(f32::INFINITY, f32::min)))
            .fold(None, |best: Option<(&Color, f32)>, (p, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((p, d)),
            });
        match farthest {
            Some((p, d)) if d > 0.0 => centers.push(*p),
            _ => break,
        }
    }
    centers
}

/// Deterministic k-means. Returns the final centres and each point's centre.
pub fn kmeans(points: &[Color], k: usize) -> (Vec<Color>, Vec<usize>) {
    let mut centers = seed_centers(points, k);
    if centers.is_empty() {
        return (centers, Vec::new());
    }
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();

    for _ in 0..MAX_ITERATIONS {
        let mut sums = vec![[0f64; 3]; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        for (p, &l) in points.iter().zip(&labels) {
            for c in 0..3 {
                sums[l][c] += p[c] as f64;
            }
            counts[l] += 1;
        }
        for (center, (sum, &count)) in centers.iter_mut().zip(sums.iter().zip(&counts)) {
            // an emptied cluster keeps its old centre
            if count > 0 {
                *center = (*sum).map(|s| (s / count as f64) as f32);
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    (centers, labels)
}

/// Centre of the largest colour cluster in the crop.
pub fn dominant_color(crop: &RgbImage) -> Color {
    let total = crop.width() as usize * crop.height() as usize;
    if total == 0 {
        return NEUTRAL_GRAY;
    }
    let step = total.div_ceil(MAX_SAMPLES);
    let pixels: Vec<Color> = crop
        .pixels()
        .step_by(step)
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();

    let (centers, labels) = kmeans(&pixels, CROP_CLUSTERS);
    let mut counts = vec![0usize; centers.len()];
    for l in labels {
        counts[l] += 1;
    }
    // first centre wins ties
    let largest = counts
        .iter()
        .enumerate()
        .fold(0, |best, (i, &n)| if n > counts[best] { i } else { best });
    centers.get(largest).copied().unwrap_or(NEUTRAL_GRAY)
}

/// Group detections by dominant colour alone.
///
/// A single detection gets the generic "Product" label. Otherwise the
/// dominant colours are clustered into at most `max_groups` groups, numbered
/// densely in the order they first appear.
pub fn group_by_color(
    image: &RgbImage,
    mut detections: Vec<Detection>,
    max_groups: usize,
) -> Result<Vec<Detection>, GroupingError> {
    if detections.is_empty() {
        return Err(GroupingError::MissingInput);
    }

    if detections.len() == 1 {
        detections[0].assign_group(&GroupLabel {
            id: 0,
            brand_name: "Product".to_string(),
            group_name: "Product Group 1".to_string(),
        });
        return Ok(detections);
    }

    let colors: Vec<Color> = detections
        .iter()
        .map(|d| dominant_color(&crop_detection(image, d.bbox())))
        .collect();
    let k = max_groups.clamp(1, detections.len());
    let (_, clusters) = kmeans(&colors, k);

    let mut order: Vec<usize> = Vec::new();
    for (det, cluster) in detections.iter_mut().zip(clusters) {
        let id = match order.iter().position(|&c| c == cluster) {
            Some(id) => id,
            None => {
                order.push(cluster);
                order.len() - 1
            }
        };
        det.assign_group(&GroupLabel {
            id,
            brand_name: format!("Brand Group {}", id + 1),
            group_name: format!("Color Group {}", id + 1),
        });
    }

    tracing::info!(
        "colour-grouped {} products into {} groups",
        detections.len(),
        order.len()
    );
    Ok(detections)
}
