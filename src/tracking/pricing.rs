use serde::{Deserialize, Serialize};

use crate::tracking::ItemCategory;

/// Price estimate attached to a confirmed item. The pipeline never interprets it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: f32,
    pub high: f32,
}

impl PriceRange {
    #[inline]
    pub fn new(low: f32, high: f32) -> Self {
        Self { low: low.min(high), high: low.max(high) }
    }
}

/// Pricing collaborator consulted once per promotion.
pub trait PriceEstimator {
    fn estimate(&self, category: ItemCategory, box_area: f32) -> PriceRange;
}

impl<F> PriceEstimator for F
where
    F: Fn(ItemCategory, f32) -> PriceRange,
{
    #[inline]
    fn estimate(&self, category: ItemCategory, box_area: f32) -> PriceRange {
        self(category, box_area)
    }
}

/// Per-category base ranges, widened for objects that fill more of the frame.
#[derive(Debug, Clone)]
pub struct CategoryPriceTable {
    /// Largest multiplier applied to a full-frame object.
    pub max_area_boost: f32,
}

impl Default for CategoryPriceTable {
    fn default() -> Self {
        Self { max_area_boost: 1.5 }
    }
}

impl CategoryPriceTable {
    fn base(category: ItemCategory) -> (f32, f32) {
        match category {
            ItemCategory::Fashion => (8.0, 40.0),
            ItemCategory::HomeGood => (5.0, 30.0),
            ItemCategory::Food => (2.0, 10.0),
            ItemCategory::Place => (0.0, 0.0),
            ItemCategory::Plant => (4.0, 25.0),
            ItemCategory::Electronics => (20.0, 150.0),
            ItemCategory::Document => (1.0, 8.0),
            ItemCategory::Unknown => (1.0, 20.0),
        }
    }
}

impl PriceEstimator for CategoryPriceTable {
    fn estimate(&self, category: ItemCategory, box_area: f32) -> PriceRange {
        let (low, high) = Self::base(category);
        let boost = 1.0 + box_area.max(0.0).min(1.0) * (self.max_area_boost - 1.0).max(0.0);

        PriceRange::new(low * boost, high * boost)
    }
}
