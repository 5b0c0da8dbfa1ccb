use crate::models::{BoundingBox, Detection};

/// Overlap threshold used for every dedup admission in the detector.
pub const DEDUP_IOU: f32 = 0.3;

/// Intersection over union of two boxes.
///
/// Symmetric, always in `[0, 1]`, exactly `0.0` for disjoint boxes.
pub fn overlap_ratio(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix1 = a.x1().max(b.x1());
    let iy1 = a.y1().max(b.y1());
    let ix2 = a.x2().min(b.x2());
    let iy2 = a.y2().min(b.y2());

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }

    let intersection = (ix2 - ix1) as i64 * (iy2 - iy1) as i64;
    let union = a.area() + b.area() - intersection;

    if union > 0 {
        (intersection as f64 / union as f64) as f32
    } else {
        0.0
    }
}

/// True when `candidate` overlaps every box in `accepted` by less than `threshold`.
pub fn is_novel(candidate: &BoundingBox, accepted: &[Detection], threshold: f32) -> bool {
    accepted
        .iter()
        .all(|existing| overlap_ratio(candidate, existing.bbox()) < threshold)
}

/// Append each candidate that passes [`is_novel`] against everything accepted so far,
/// including candidates admitted earlier in the same call. Returns how many were admitted.
pub fn admit_novel(
    accepted: &mut Vec<Detection>,
    candidates: impl IntoIterator<Item = Detection>,
    threshold: f32,
) -> usize {
    let mut admitted = 0;
    for candidate in candidates {
        if is_novel(candidate.bbox(), accepted, threshold) {
            accepted.push(candidate);
            admitted += 1;
        }
    }
    admitted
}
