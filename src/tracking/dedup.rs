use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{self, Error};
use crate::tracking::similarity::{label_similarity, ratio_of_areas, AREA_EPSILON};
use crate::tracking::{ConfirmedItem, ItemCategory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Largest accepted `1 - areaRatio` when both sides carry a size.
    pub max_size_difference_ratio: f32,
    /// Largest accepted center distance when both sides carry a box.
    pub max_center_distance: f32,
    /// Minimum label similarity when both sides carry a label.
    pub min_label_similarity: f32,
    /// Pixel area a thumbnail is measured against when no box is known.
    pub reference_frame_area: f32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_size_difference_ratio: 0.4,
            max_center_distance: 0.25,
            min_label_similarity: 0.7,
            reference_frame_area: 1280.0 * 720.0,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<(), Error> {
        error::check_unit("max_size_difference_ratio", self.max_size_difference_ratio)?;
        error::check_non_negative("max_center_distance", self.max_center_distance)?;
        error::check_unit("min_label_similarity", self.min_label_similarity)?;

        if !(self.reference_frame_area > 0.0) {
            return Err(Error::invalid("reference_frame_area", "must be positive"));
        }

        Ok(())
    }
}

/// Comparison metadata cached per visible item.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub item_id: String,
    pub category: ItemCategory,
    pub label: Option<String>,
    /// Normalized area, present only when a box or thumbnail provides one.
    pub area: Option<f32>,
    /// Box center, `(0.5, 0.5)` when unknown.
    pub center: (f32, f32),
    pub has_center: bool,
    pub has_thumbnail: bool,
}

impl SessionRecord {
    fn from_item(item: &ConfirmedItem, config: &DedupConfig) -> Self {
        let bbox = item.valid_bbox();

        let area = Some(item.normalized_area())
            .filter(|&a| a >= AREA_EPSILON)
            .or_else(|| {
                item.thumbnail
                    .as_ref()
                    .map(|t| (t.pixel_count() as f32 / config.reference_frame_area).min(1.0))
                    .filter(|&a| a >= AREA_EPSILON)
            });

        Self {
            item_id: item.id.clone(),
            category: item.category,
            label: item
                .label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            area,
            center: bbox.map(|b| b.center()).unwrap_or((0.5, 0.5)),
            has_center: bbox.is_some(),
            has_thumbnail: item.thumbnail.is_some(),
        }
    }

    /// Anything beyond category and id to tell two records apart.
    #[inline]
    pub fn has_distinguishing_feature(&self) -> bool {
        self.area.is_some() || self.has_thumbnail
    }
}

/// Last gate before an item enters the visible session list.
pub struct SessionDeduplicator {
    config: DedupConfig,
    records: HashMap<String, SessionRecord>,
}

impl Default for SessionDeduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl SessionDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Id of an existing item that is the same physical object as `new_item`, if any.
    ///
    /// An exact id match wins immediately; otherwise the first existing item
    /// passing every applicable check is returned.
    pub fn find_similar_item(&mut self, new_item: &ConfirmedItem, existing: &[ConfirmedItem]) -> Option<String> {
        if let Some(same) = existing.iter().find(|e| e.id == new_item.id) {
            return Some(same.id.clone());
        }

        let candidate = self.record_for(new_item);

        for item in existing {
            let record = self.record_for(item);
            if self.is_similar(&candidate, &record) {
                debug!("{} duplicates session item {}", new_item.id, item.id);
                return Some(item.id.clone());
            }
        }

        None
    }

    #[inline]
    pub fn is_duplicate(&mut self, new_item: &ConfirmedItem, existing: &[ConfirmedItem]) -> bool {
        self.find_similar_item(new_item, existing).is_some()
    }

    fn record_for(&mut self, item: &ConfirmedItem) -> SessionRecord {
        let config = &self.config;
        self.records
            .entry(item.id.clone())
            .or_insert_with(|| SessionRecord::from_item(item, config))
            .clone()
    }

    fn is_similar(&self, a: &SessionRecord, b: &SessionRecord) -> bool {
        if a.category != b.category {
            return false;
        }

        // Two bare records differ only by id; never call them the same object.
        if !a.has_distinguishing_feature() && !b.has_distinguishing_feature() {
            return false;
        }

        if let (Some(la), Some(lb)) = (&a.label, &b.label) {
            if label_similarity(la, lb) < self.config.min_label_similarity {
                return false;
            }
        }

        if let (Some(area_a), Some(area_b)) = (a.area, b.area) {
            if 1.0 - ratio_of_areas(area_a, area_b) > self.config.max_size_difference_ratio {
                return false;
            }
        }

        if a.has_center && b.has_center {
            let distance = ((a.center.0 - b.center.0).powi(2) + (a.center.1 - b.center.1).powi(2)).sqrt();
            if distance > self.config.max_center_distance {
                return false;
            }
        }

        true
    }

    /// Forget cached metadata for `item_id`; absent ids are ignored.
    pub fn remove_item(&mut self, item_id: &str) {
        self.records.remove(item_id);
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    #[inline]
    pub fn cached_records(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{BBox, Thumbnail};

    fn boxed(id: &str, side_px: f32) -> ConfirmedItem {
        let half = side_px / 2.0;
        ConfirmedItem::new(id, ItemCategory::Fashion, 0.6).with_bbox(BBox::from_pixels(
            [500.0 - half, 400.0 - half, 500.0 + half, 400.0 + half],
            1000.0,
            1000.0,
        ))
    }

    #[test]
    fn exact_id_short_circuits() {
        let mut dedup = SessionDeduplicator::default();
        let a = ConfirmedItem::new("same", ItemCategory::Food, 0.5);
        let mut b = ConfirmedItem::new("same", ItemCategory::Plant, 0.9);
        b.label = Some("different".into());

        assert_eq!(dedup.find_similar_item(&b, &[a]), Some("same".to_string()));
        assert_eq!(dedup.cached_records(), 0);
    }

    #[test]
    fn featureless_records_never_match() {
        let mut dedup = SessionDeduplicator::default();
        let a = ConfirmedItem::new("a", ItemCategory::Food, 0.5);
        let b = ConfirmedItem::new("b", ItemCategory::Food, 0.5);

        assert_eq!(dedup.find_similar_item(&b, &[a]), None);
    }

    #[test]
    fn one_featured_side_matches_on_category() {
        let mut dedup = SessionDeduplicator::default();
        let bare = ConfirmedItem::new("a", ItemCategory::Fashion, 0.5);

        assert_eq!(dedup.find_similar_item(&boxed("b", 200.0), &[bare]), Some("a".to_string()));
    }

    #[test]
    fn size_tolerance() {
        let mut dedup = SessionDeduplicator::default();
        let existing = [boxed("a", 200.0)];

        assert_eq!(dedup.find_similar_item(&boxed("b", 210.0), &existing), Some("a".to_string()));
        assert_eq!(dedup.find_similar_item(&boxed("c", 400.0), &existing), None);
    }

    #[test]
    fn labels_must_agree_when_both_present() {
        let mut dedup = SessionDeduplicator::default();
        let existing = [boxed("a", 200.0).with_label("Denim Jacket")];

        assert!(dedup.is_duplicate(&boxed("b", 200.0).with_label("denim jacket"), &existing));
        assert!(!dedup.is_duplicate(&boxed("c", 200.0).with_label("sandal"), &existing));
        assert!(dedup.is_duplicate(&boxed("d", 200.0), &existing));
    }

    #[test]
    fn thumbnail_counts_as_feature() {
        let mut dedup = SessionDeduplicator::default();
        let with_thumb = ConfirmedItem::new("a", ItemCategory::Food, 0.5)
            .with_thumbnail(Thumbnail::new(320, 240, vec![0u8; 4]));
        let bare = ConfirmedItem::new("b", ItemCategory::Food, 0.5);

        assert!(dedup.is_duplicate(&bare, &[with_thumb]));
    }

    #[test]
    fn far_apart_items_are_distinct() {
        let mut dedup = SessionDeduplicator::default();
        let left = ConfirmedItem::new("a", ItemCategory::Fashion, 0.5).with_bbox(BBox::ltrb(0.0, 0.0, 0.2, 0.2));
        let right = ConfirmedItem::new("b", ItemCategory::Fashion, 0.5).with_bbox(BBox::ltrb(0.8, 0.8, 1.0, 1.0));

        assert!(!dedup.is_duplicate(&right, &[left]));
    }

    #[test]
    fn removal_and_reset_rebuild_lazily() {
        let mut dedup = SessionDeduplicator::default();
        let existing = [boxed("a", 200.0)];
        assert!(dedup.is_duplicate(&boxed("b", 205.0), &existing));
        assert_eq!(dedup.cached_records(), 2);

        dedup.remove_item("a");
        dedup.remove_item("missing");
        assert_eq!(dedup.cached_records(), 1);

        dedup.reset();
        assert_eq!(dedup.cached_records(), 0);
        assert!(dedup.is_duplicate(&boxed("b", 205.0), &existing));
    }
}
