use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tracking::pricing::PriceRange;
use crate::tracking::{BBox, Ltrb};

/// Coarse item category assigned by the upstream classification step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Fashion,
    HomeGood,
    Food,
    Place,
    Plant,
    Electronics,
    Document,
    Unknown,
}

impl ItemCategory {
    /// Maps a free-form detector label to a category.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();

        const TABLE: &[(&str, ItemCategory)] = &[
            ("fashion", ItemCategory::Fashion),
            ("clothing", ItemCategory::Fashion),
            ("shoe", ItemCategory::Fashion),
            ("bag", ItemCategory::Fashion),
            ("home", ItemCategory::HomeGood),
            ("furniture", ItemCategory::HomeGood),
            ("food", ItemCategory::Food),
            ("place", ItemCategory::Place),
            ("plant", ItemCategory::Plant),
            ("flower", ItemCategory::Plant),
            ("electronic", ItemCategory::Electronics),
            ("phone", ItemCategory::Electronics),
            ("laptop", ItemCategory::Electronics),
            ("document", ItemCategory::Document),
            ("book", ItemCategory::Document),
        ];

        TABLE
            .iter()
            .find(|(needle, _)| label.contains(needle))
            .map(|&(_, category)| category)
            .unwrap_or(ItemCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Fashion => "fashion",
            ItemCategory::HomeGood => "home_good",
            ItemCategory::Food => "food",
            ItemCategory::Place => "place",
            ItemCategory::Plant => "plant",
            ItemCategory::Electronics => "electronics",
            ItemCategory::Document => "document",
            ItemCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable RGBA crop of a detected object.
///
/// Clones share the pixel buffer, so carrying a thumbnail from a candidate into
/// a confirmed or aggregated item never copies the image. The buffer is freed
/// once the last owning entity is dropped.
#[derive(Clone, PartialEq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pixels: Arc<[u8]>,
}

impl Thumbnail {
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether two handles point at the same buffer.
    #[inline]
    pub fn shares_buffer(&self, other: &Thumbnail) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

///
/// One raw observation of an object in a single frame.
///
/// tracking_id : Optional detector-side id, stable-ish across frames.
/// bbox : Optional box in normalized `(left, top, right, bottom)` coordinates.
/// confidence : Detector confidence in `[0, 1]`.
/// box_area : Normalized box area; `0.0` means "derive from `bbox`".
///
#[derive(Debug, Clone)]
pub struct Detection {
    pub tracking_id: Option<String>,
    pub bbox: Option<BBox<Ltrb>>,
    pub confidence: f32,
    pub category: ItemCategory,
    pub label: Option<String>,
    pub thumbnail: Option<Thumbnail>,
    pub box_area: f32,
}

impl Detection {
    pub fn new(category: ItemCategory, confidence: f32) -> Self {
        Self {
            tracking_id: None,
            bbox: None,
            confidence,
            category,
            label: None,
            thumbnail: None,
            box_area: 0.0,
        }
    }

    pub fn with_tracking_id(mut self, id: impl Into<String>) -> Self {
        self.tracking_id = Some(id.into());
        self
    }

    pub fn with_bbox(mut self, bbox: BBox<Ltrb>) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Thumbnail) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_box_area(mut self, area: f32) -> Self {
        self.box_area = area;
        self
    }

    /// The box if present and well-formed.
    #[inline]
    pub fn valid_bbox(&self) -> Option<BBox<Ltrb>> {
        self.bbox.filter(|b| b.is_valid())
    }

    /// Explicit `box_area` when set, otherwise the area of a valid box.
    pub fn normalized_area(&self) -> f32 {
        if self.box_area > 0.0 {
            self.box_area
        } else {
            self.valid_bbox().map(|b| b.area()).unwrap_or(0.0)
        }
    }
}

/// A candidate that crossed the promotion threshold, handed downstream.
#[derive(Debug, Clone)]
pub struct ConfirmedItem {
    pub id: String,
    pub category: ItemCategory,
    pub label: Option<String>,
    pub confidence: f32,
    pub bbox: Option<BBox<Ltrb>>,
    pub box_area: f32,
    pub price_range: PriceRange,
    pub thumbnail: Option<Thumbnail>,
    pub first_seen_ms: u64,
    pub confirmed_at_ms: u64,
}

impl ConfirmedItem {
    /// Builds an item that did not come out of a tracker, e.g. one restored by the host.
    pub fn new(id: impl Into<String>, category: ItemCategory, confidence: f32) -> Self {
        Self {
            id: id.into(),
            category,
            label: None,
            confidence,
            bbox: None,
            box_area: 0.0,
            price_range: PriceRange::default(),
            thumbnail: None,
            first_seen_ms: 0,
            confirmed_at_ms: 0,
        }
    }

    pub fn with_bbox(mut self, bbox: BBox<Ltrb>) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Thumbnail) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_box_area(mut self, area: f32) -> Self {
        self.box_area = area;
        self
    }

    #[inline]
    pub fn valid_bbox(&self) -> Option<BBox<Ltrb>> {
        self.bbox.filter(|b| b.is_valid())
    }

    pub fn normalized_area(&self) -> f32 {
        if self.box_area > 0.0 {
            self.box_area
        } else {
            self.valid_bbox().map(|b| b.area()).unwrap_or(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_label() {
        assert_eq!(ItemCategory::from_label("Running Shoe"), ItemCategory::Fashion);
        assert_eq!(ItemCategory::from_label(" laptop "), ItemCategory::Electronics);
        assert_eq!(ItemCategory::from_label("potted plant"), ItemCategory::Plant);
        assert_eq!(ItemCategory::from_label("???"), ItemCategory::Unknown);
    }

    #[test]
    fn thumbnail_clone_shares_buffer() {
        let thumb = Thumbnail::new(2, 2, vec![0u8; 16]);
        let copy = thumb.clone();
        assert!(thumb.shares_buffer(&copy));
        assert_eq!(copy.pixel_count(), 4);
    }

    #[test]
    fn area_falls_back_to_bbox() {
        let det = Detection::new(ItemCategory::Food, 0.5)
            .with_bbox(BBox::ltrb(0.0, 0.0, 0.5, 0.5));
        assert!((det.normalized_area() - 0.25).abs() < 1e-6);

        let det = det.with_box_area(0.1);
        assert!((det.normalized_area() - 0.1).abs() < 1e-6);

        let broken = Detection::new(ItemCategory::Food, 0.5)
            .with_bbox(BBox::ltrb(0.5, 0.5, 0.1, 0.1));
        assert!(broken.valid_bbox().is_none());
        assert_eq!(broken.normalized_area(), 0.0);
    }
}
