use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{self, Error};
use crate::tracking::similarity::{centroid_distance, label_similarity, ratio_of_areas, AREA_EPSILON};
use crate::tracking::{
    BBox, Clock, ConfidenceGated, ConfirmedItem, ItemCategory, Ltrb, PriceRange, Sighting,
    SystemClock, Thumbnail,
};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub category: f32,
    pub label: f32,
    pub size: f32,
    pub distance: f32,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            category: 0.30,
            label: 0.25,
            size: 0.20,
            distance: 0.25,
        }
    }
}

impl SimilarityWeights {
    #[inline]
    pub fn total(&self) -> f32 {
        self.category + self.label + self.size + self.distance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Minimum weighted similarity for a merge.
    pub similarity_threshold: f32,
    /// Centroid distance (normalized units) beyond which items never merge.
    pub max_center_distance_ratio: f32,
    /// Largest accepted `1 - areaRatio`.
    pub max_size_difference_ratio: f32,
    pub category_match_required: bool,
    pub label_match_required: bool,
    pub weights: SimilarityWeights,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            max_center_distance_ratio: 0.25,
            max_size_difference_ratio: 0.5,
            category_match_required: true,
            label_match_required: false,
            weights: SimilarityWeights::default(),
        }
    }
}

/// Named tunings for common scanning situations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPreset {
    Balanced,
    /// Fewer merges; for cluttered scenes with many look-alike objects.
    Strict,
    /// More merges; for a handheld camera sweeping over few objects.
    Loose,
    /// Geometry-heavy; for detectors that rarely produce labels.
    Realtime,
}

impl From<AggregationPreset> for AggregationConfig {
    fn from(preset: AggregationPreset) -> Self {
        let balanced = AggregationConfig::default();

        match preset {
            AggregationPreset::Balanced => balanced,
            AggregationPreset::Strict => AggregationConfig {
                similarity_threshold: 0.75,
                max_center_distance_ratio: 0.15,
                max_size_difference_ratio: 0.3,
                ..balanced
            },
            AggregationPreset::Loose => AggregationConfig {
                similarity_threshold: 0.5,
                max_center_distance_ratio: 0.35,
                max_size_difference_ratio: 0.6,
                ..balanced
            },
            AggregationPreset::Realtime => AggregationConfig {
                similarity_threshold: 0.55,
                max_center_distance_ratio: 0.3,
                weights: SimilarityWeights {
                    category: 0.30,
                    label: 0.10,
                    size: 0.25,
                    distance: 0.35,
                },
                ..balanced
            },
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<(), Error> {
        error::check_unit("similarity_threshold", self.similarity_threshold)?;
        error::check_non_negative("max_center_distance_ratio", self.max_center_distance_ratio)?;
        error::check_unit("max_size_difference_ratio", self.max_size_difference_ratio)?;
        error::check_non_negative("weights.category", self.weights.category)?;
        error::check_non_negative("weights.label", self.weights.label)?;
        error::check_non_negative("weights.size", self.weights.size)?;
        error::check_non_negative("weights.distance", self.weights.distance)?;

        if self.weights.total() <= 0.0 {
            warn!("All aggregation weights are zero; no detection will ever merge");
        }

        Ok(())
    }
}

/// A long-lived entity absorbing every detection judged to be the same object.
#[derive(Debug, Clone)]
pub struct AggregatedItem {
    pub aggregated_id: String,
    /// Id of the first item merged in; the canonical id shown downstream.
    pub primary_source_id: String,
    pub bbox: Option<BBox<Ltrb>>,
    pub box_area: f32,
    pub average_confidence: f32,
    pub merge_count: u32,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub source_ids: BTreeSet<String>,
    pub price_range: PriceRange,

    best: ConfidenceGated<Sighting>,
}

impl AggregatedItem {
    fn new(item: &ConfirmedItem, now_ms: u64) -> Self {
        Self {
            aggregated_id: format!("agg_{}", Uuid::new_v4().simple()),
            primary_source_id: item.id.clone(),
            bbox: item.valid_bbox(),
            box_area: item.normalized_area(),
            average_confidence: item.confidence,
            merge_count: 1,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            source_ids: std::iter::once(item.id.clone()).collect(),
            price_range: item.price_range,
            best: ConfidenceGated::new(Sighting::from(item), item.confidence),
        }
    }

    fn merge(&mut self, item: &ConfirmedItem, now_ms: u64) {
        self.average_confidence = (self.average_confidence * self.merge_count as f32
            + item.confidence)
            / (self.merge_count + 1) as f32;
        self.merge_count += 1;
        self.last_seen_ms = now_ms;
        self.source_ids.insert(item.id.clone());

        if let Some(bbox) = item.valid_bbox() {
            self.bbox = Some(bbox);
        }

        let area = item.normalized_area();
        if area > 0.0 {
            self.box_area = area;
        }

        if self.best.update_sighting(Sighting::from(item), item.confidence) {
            self.price_range = item.price_range;
        }
    }

    #[inline]
    pub fn category(&self) -> ItemCategory {
        self.best.category()
    }

    #[inline]
    pub fn max_confidence(&self) -> f32 {
        self.best.confidence()
    }

    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.best.label()
    }

    #[inline]
    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.best.thumbnail()
    }

    /// Downstream view keyed by the canonical source id.
    pub fn to_confirmed_item(&self) -> ConfirmedItem {
        ConfirmedItem {
            id: self.primary_source_id.clone(),
            category: self.category(),
            label: self.label().map(str::to_string),
            confidence: self.max_confidence(),
            bbox: self.bbox,
            box_area: self.box_area,
            price_range: self.price_range,
            thumbnail: self.thumbnail().cloned(),
            first_seen_ms: self.first_seen_ms,
            confirmed_at_ms: self.last_seen_ms,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AggregationOutcome {
    Created,
    Merged { similarity: f32 },
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct AggregatorStats {
    pub total_items: usize,
    /// Sum of `merge_count - 1` across items.
    pub total_merges: u64,
    /// `total_merges / total_items`.
    pub average_merges_per_item: f32,
}

/// Streaming merge engine over aggregated items.
///
/// Every incoming item is scored against all live aggregates; the live set is
/// bounded by the objects in view, so the linear scan stays small.
pub struct ItemAggregator<C: Clock = SystemClock> {
    config: AggregationConfig,
    clock: C,
    items: Vec<AggregatedItem>,
}

impl ItemAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> ItemAggregator<C> {
    pub fn with_clock(config: AggregationConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            items: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Merge `item` into its best match or start a new aggregate.
    /// Returns a copy of the resulting aggregate.
    #[inline]
    pub fn process_detection(&mut self, item: &ConfirmedItem) -> AggregatedItem {
        self.process(item).0
    }

    /// Like [`process_detection`](Self::process_detection), also reporting
    /// whether a merge happened.
    pub fn process(&mut self, item: &ConfirmedItem) -> (AggregatedItem, AggregationOutcome) {
        let now = self.clock.now_ms();

        let mut best: Option<(usize, f32)> = None;
        for (idx, existing) in self.items.iter().enumerate() {
            let score = self.similarity(existing, item);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, similarity)) if similarity >= self.config.similarity_threshold => {
                let target = &mut self.items[idx];
                target.merge(item, now);

                debug!(
                    "Merged {} into {} (similarity {:.3}, merges {})",
                    item.id, target.aggregated_id, similarity, target.merge_count
                );

                (target.clone(), AggregationOutcome::Merged { similarity })
            }
            _ => {
                let created = AggregatedItem::new(item, now);

                info!(
                    "New aggregated item {} from {} ({})",
                    created.aggregated_id, item.id, item.category
                );

                self.items.push(created.clone());
                (created, AggregationOutcome::Created)
            }
        }
    }

    /// Weighted similarity in [0, 1] between an aggregate and an incoming item.
    ///
    /// Category (when required), size and distance act as hard filters that
    /// force 0. A missing label or box scores 0 for its factor but its weight
    /// still counts toward the normalization.
    pub fn similarity(&self, existing: &AggregatedItem, item: &ConfirmedItem) -> f32 {
        let config = &self.config;
        let same_category = existing.category() == item.category;

        if config.category_match_required && !same_category {
            return 0.0;
        }

        let total = config.weights.total();
        if total <= 0.0 {
            warn!("All aggregation weights are zero; treating as no match");
            return 0.0;
        }

        let category_score = if same_category { 1.0 } else { 0.0 };

        let labels = (
            existing.label().map(str::trim).filter(|l| !l.is_empty()),
            item.label.as_deref().map(str::trim).filter(|l| !l.is_empty()),
        );
        let label_score = match labels {
            (Some(a), Some(b)) => label_similarity(a, b),
            _ if config.label_match_required => return 0.0,
            _ => 0.0,
        };

        let size_score = {
            let (a, b) = (existing.box_area, item.normalized_area());
            if a >= AREA_EPSILON && b >= AREA_EPSILON {
                let ratio = ratio_of_areas(a, b);
                if 1.0 - ratio > config.max_size_difference_ratio {
                    return 0.0;
                }
                ratio
            } else {
                0.0
            }
        };

        let distance_score = match (existing.bbox.as_ref(), item.valid_bbox()) {
            (Some(a), Some(b)) => {
                let distance = centroid_distance(a, &b);
                if distance > config.max_center_distance_ratio {
                    return 0.0;
                }

                if config.max_center_distance_ratio > 0.0 {
                    1.0 - (distance / config.max_center_distance_ratio).min(1.0)
                } else {
                    1.0
                }
            }
            _ => 0.0,
        };

        let w = &config.weights;
        (w.category * category_score
            + w.label * label_score
            + w.size * size_score
            + w.distance * distance_score)
            / total
    }

    /// Evict aggregates not refreshed within `max_age_ms`. Returns how many were removed.
    pub fn remove_stale_items(&mut self, max_age_ms: u64) -> usize {
        let now = self.clock.now_ms();
        let before = self.items.len();

        self.items
            .retain(|item| now.saturating_sub(item.last_seen_ms) <= max_age_ms);

        let removed = before - self.items.len();
        if removed > 0 {
            debug!("Removed {} stale aggregated items", removed);
        }

        removed
    }

    pub fn remove_item(&mut self, aggregated_id: &str) -> Option<AggregatedItem> {
        let idx = self
            .items
            .iter()
            .position(|i| i.aggregated_id == aggregated_id)?;

        Some(self.items.remove(idx))
    }

    #[inline]
    pub fn get_item(&self, aggregated_id: &str) -> Option<&AggregatedItem> {
        self.items.iter().find(|i| i.aggregated_id == aggregated_id)
    }

    /// Owned copy of the live aggregates in creation order.
    #[inline]
    pub fn aggregated_items(&self) -> Vec<AggregatedItem> {
        self.items.clone()
    }

    pub fn scanned_items(&self) -> Vec<ConfirmedItem> {
        self.items.iter().map(AggregatedItem::to_confirmed_item).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn reset(&mut self) {
        self.items.clear();
        info!("Item aggregator reset");
    }

    pub fn get_stats(&self) -> AggregatorStats {
        let total_items = self.items.len();
        let total_merges: u64 = self.items.iter().map(|i| i.merge_count as u64 - 1).sum();

        AggregatorStats {
            total_items,
            total_merges,
            average_merges_per_item: if total_items > 0 {
                total_merges as f32 / total_items as f32
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::ManualClock;
    use approx::assert_abs_diff_eq;

    fn aggregator(config: AggregationConfig) -> (ItemAggregator<ManualClock>, ManualClock) {
        let clock = ManualClock::new(10_000);
        (ItemAggregator::with_clock(config, clock.clone()), clock)
    }

    /// Square pixel box centred at (500, 500) in a 1000x1000 frame.
    fn item(id: &str, side_px: f32, confidence: f32) -> ConfirmedItem {
        let half = side_px / 2.0;
        ConfirmedItem::new(id, ItemCategory::HomeGood, confidence).with_bbox(BBox::from_pixels(
            [500.0 - half, 500.0 - half, 500.0 + half, 500.0 + half],
            1000.0,
            1000.0,
        ))
    }

    #[test]
    fn close_items_merge() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        let first = agg.process_detection(&item("track-1", 200.0, 0.6));
        let (merged, outcome) = agg.process(&item("track-2", 205.0, 0.7));

        assert!(matches!(outcome, AggregationOutcome::Merged { .. }));
        assert_eq!(merged.aggregated_id, first.aggregated_id);
        assert_eq!(merged.primary_source_id, "track-1");
        assert_eq!(merged.merge_count, 2);
        assert!(merged.source_ids.contains("track-2"));
        assert_abs_diff_eq!(merged.max_confidence(), 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(merged.average_confidence, 0.65, epsilon = 1e-6);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn merged_label_follows_running_max() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        agg.process_detection(&item("a", 200.0, 0.5).with_label("lamp"));
        agg.process_detection(&item("b", 200.0, 0.9));
        let merged = agg.process_detection(&item("c", 200.0, 0.6).with_label("lump"));

        assert_eq!(merged.merge_count, 3);
        assert_eq!(merged.label(), Some("lamp"));
        assert_abs_diff_eq!(merged.max_confidence(), 0.9, epsilon = 1e-6);
    }

    #[test]
    fn label_agreement_decides_boxless_merge() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        let sized = |id: &str, label: &str| {
            ConfirmedItem::new(id, ItemCategory::HomeGood, 0.8)
                .with_box_area(0.04)
                .with_label(label)
        };
        let first = agg.process_detection(&sized("a", "desk"));

        // Category and size alone reach 0.5; the label weight tips it over 0.6.
        assert_abs_diff_eq!(agg.similarity(&first, &sized("x", "mug")), 0.5, epsilon = 1e-6);
        assert_eq!(agg.process(&sized("b", "mug")).1, AggregationOutcome::Created);

        let (merged, outcome) = agg.process(&sized("c", "Desk"));
        assert!(matches!(outcome, AggregationOutcome::Merged { .. }));
        assert_eq!(merged.primary_source_id, "a");
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn category_mismatch_scores_zero() {
        let (agg, _) = aggregator(AggregationConfig::default());
        let existing = AggregatedItem::new(&item("a", 200.0, 0.9).with_label("lamp"), 0);
        let mut other = item("b", 200.0, 0.9).with_label("lamp");
        other.category = ItemCategory::Food;

        assert_eq!(agg.similarity(&existing, &other), 0.0);
    }

    #[test]
    fn size_filter_boundary() {
        let (agg, _) = aggregator(AggregationConfig::default());
        let existing = AggregatedItem::new(&item("a", 200.0, 0.9), 0);

        assert_eq!(agg.similarity(&existing, &item("b", 400.0, 0.9)), 0.0);
        assert!(agg.similarity(&existing, &item("c", 210.0, 0.9)) > 0.6);

        let config = AggregationConfig { max_size_difference_ratio: 0.75, ..Default::default() };
        let (agg, _) = aggregator(config);
        let exact = ConfirmedItem::new("d", ItemCategory::HomeGood, 0.9).with_box_area(0.25);
        let mut existing = AggregatedItem::new(&exact, 0);
        existing.box_area = 0.0625;
        assert!(agg.similarity(&existing, &exact) > 0.0);
    }

    #[test]
    fn distant_items_never_merge() {
        let (agg, _) = aggregator(AggregationConfig::default());
        let existing = AggregatedItem::new(&item("a", 100.0, 0.9), 0);
        let far = ConfirmedItem::new("b", ItemCategory::HomeGood, 0.9)
            .with_bbox(BBox::ltrb(0.85, 0.85, 0.95, 0.95));

        assert_eq!(agg.similarity(&existing, &far), 0.0);
    }

    #[test]
    fn label_requirement_is_a_hard_filter() {
        let config = AggregationConfig { label_match_required: true, ..Default::default() };
        let (agg, _) = aggregator(config);
        let existing = AggregatedItem::new(&item("a", 200.0, 0.9), 0);

        assert_eq!(agg.similarity(&existing, &item("b", 200.0, 0.9).with_label("mug")), 0.0);
    }

    #[test]
    fn zero_weights_do_not_divide_by_zero() {
        let config = AggregationConfig {
            weights: SimilarityWeights { category: 0.0, label: 0.0, size: 0.0, distance: 0.0 },
            ..Default::default()
        };
        let (mut agg, _) = aggregator(config);
        agg.process_detection(&item("a", 200.0, 0.9));
        let (_, outcome) = agg.process(&item("b", 200.0, 0.9));

        assert_eq!(outcome, AggregationOutcome::Created);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn featureless_items_stay_apart() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        agg.process_detection(&ConfirmedItem::new("a", ItemCategory::Food, 0.9));
        agg.process_detection(&ConfirmedItem::new("b", ItemCategory::Food, 0.9));
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn average_confidence_is_mean_of_inputs() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        let confidences = [0.5f32, 0.9, 0.7, 0.3, 0.6];
        let mut last = None;
        for (i, &c) in confidences.iter().enumerate() {
            last = Some(agg.process_detection(&item(&format!("d{}", i), 200.0, c)));
        }

        let last = last.unwrap();
        assert_eq!(last.merge_count, confidences.len() as u32);
        let mean = confidences.iter().sum::<f32>() / confidences.len() as f32;
        assert_abs_diff_eq!(last.average_confidence, mean, epsilon = 1e-5);
    }

    #[test]
    fn stale_items_are_evicted() {
        let (mut agg, clock) = aggregator(AggregationConfig::default());
        agg.process_detection(&item("a", 200.0, 0.9));
        clock.advance(500);
        agg.process_detection(
            &ConfirmedItem::new("b", ItemCategory::Food, 0.9).with_bbox(BBox::ltrb(0.1, 0.1, 0.2, 0.2)),
        );

        clock.advance(600);
        assert_eq!(agg.remove_stale_items(1_000), 1);
        assert_eq!(agg.scanned_items()[0].id, "b");
    }

    #[test]
    fn unmerged_item_reports_no_merges() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        agg.process_detection(&item("a", 200.0, 0.9));

        let stats = agg.get_stats();
        assert_eq!(stats.total_merges, 0);
        assert_eq!(stats.average_merges_per_item, 0.0);
    }

    #[test]
    fn stats_count_merges() {
        let (mut agg, _) = aggregator(AggregationConfig::default());
        for i in 0..3 {
            agg.process_detection(&item(&format!("a{}", i), 200.0, 0.8));
        }
        agg.process_detection(
            &ConfirmedItem::new("b", ItemCategory::Food, 0.9).with_bbox(BBox::ltrb(0.1, 0.1, 0.2, 0.2)),
        );

        let stats = agg.get_stats();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.total_merges, 2);
        assert_abs_diff_eq!(stats.average_merges_per_item, 1.0, epsilon = 1e-6);

        agg.reset();
        assert_eq!(agg.get_stats(), AggregatorStats::default());
    }

    #[test]
    fn presets_validate() {
        for preset in &[
            AggregationPreset::Balanced,
            AggregationPreset::Strict,
            AggregationPreset::Loose,
            AggregationPreset::Realtime,
        ] {
            assert!(AggregationConfig::from(*preset).validate().is_ok());
        }
    }
}
