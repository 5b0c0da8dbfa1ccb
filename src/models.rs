use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in image pixel coordinates, `x1 < x2` and `y1 < y2`.
///
/// Serialised as `[x1, y1, x2, y2]`; zero-area boxes are rejected on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl BoundingBox {
    /// Returns `None` for degenerate (zero or negative area) boxes.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        if x1 < x2 && y1 < y2 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Box from a top-left corner and a size.
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Option<Self> {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn x1(&self) -> i32 {
        self.x1
    }

    pub fn y1(&self) -> i32 {
        self.y1
    }

    pub fn x2(&self) -> i32 {
        self.x2
    }

    pub fn y2(&self) -> i32 {
        self.y2
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Clip to an image of the given size, `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        Self::new(
            self.x1.clamp(0, w),
            self.y1.clamp(0, h),
            self.x2.clamp(0, w),
            self.y2.clamp(0, h),
        )
    }
}

impl TryFrom<[i32; 4]> for BoundingBox {
    type Error = String;

    fn try_from([x1, y1, x2, y2]: [i32; 4]) -> Result<Self, Self::Error> {
        Self::new(x1, y1, x2, y2)
            .ok_or_else(|| format!("degenerate bounding box [{x1}, {y1}, {x2}, {y2}]"))
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Group label shared by every member of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLabel {
    pub id: usize,
    pub brand_name: String,
    pub group_name: String,
}

impl GroupLabel {
    /// Label whose group name is derived from the brand, e.g. "Tide Products".
    pub fn for_brand(id: usize, brand_name: impl Into<String>) -> Self {
        let brand_name = brand_name.into();
        let group_name = format!("{brand_name} Products");
        Self {
            id,
            brand_name,
            group_name,
        }
    }
}

/// One located product.
///
/// The detector fills in `bbox` and `confidence`; the grouping fields stay
/// empty until the grouping engine assigns a [`GroupLabel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    bbox: BoundingBox,
    confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_name: Option<String>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            group_id: None,
            brand_name: None,
            group_name: None,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn group_id(&self) -> Option<usize> {
        self.group_id
    }

    pub fn brand_name(&self) -> Option<&str> {
        self.brand_name.as_deref()
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group_name.as_deref()
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some() && self.brand_name.is_some() && self.group_name.is_some()
    }

    /// Set all three grouping fields at once from the group's label.
    pub fn assign_group(&mut self, label: &GroupLabel) {
        self.group_id = Some(label.id);
        self.brand_name = Some(label.brand_name.clone());
        self.group_name = Some(label.group_name.clone());
    }
}

/// Derived view of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: usize,
    pub brand_name: String,
    pub member_count: usize,
}

/// Recompute the group summaries of a grouped detection set, ordered by id.
/// Ungrouped detections are ignored.
pub fn summarize_groups(detections: &[Detection]) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<usize, GroupSummary> = BTreeMap::new();
    for det in detections {
        let Some(id) = det.group_id() else { continue };
        groups
            .entry(id)
            .and_modify(|g| g.member_count += 1)
            .or_insert_with(|| GroupSummary {
                group_id: id,
                brand_name: det.brand_name().unwrap_or_default().to_string(),
                member_count: 1,
            });
    }
    groups.into_values().collect()
}

/// Outer contour found by the edge-based detector.
#[derive(Debug, Clone)]
pub struct Contour {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    /// Area enclosed by the contour polygon.
    pub area: f32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Fraction of the bounding rectangle covered by the contour.
    pub fn fill_ratio(&self) -> f32 {
        let bbox_area = (self.width() * self.height()) as f32;
        if bbox_area == 0.0 {
            return 0.0;
        }
        self.area / bbox_area
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_xywh(
            self.min_x as i32,
            self.min_y as i32,
            self.width() as i32,
            self.height() as i32,
        )
    }
}
