use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{self, Error};
use crate::tracking::{
    BBox, CategoryPriceTable, Clock, ConfidenceGated, ConfirmedItem, Detection, ItemCategory,
    Ltrb, PriceEstimator, Sighting, SystemClock, Thumbnail,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateTrackerConfig {
    /// Observations required before promotion.
    pub min_seen_count: u32,
    /// Best confidence required before promotion.
    pub min_confidence: f32,
    /// Candidates unseen for longer than this are dropped on cleanup.
    pub candidate_timeout_ms: u64,
}

impl Default for CandidateTrackerConfig {
    fn default() -> Self {
        Self {
            min_seen_count: 2,
            min_confidence: 0.4,
            candidate_timeout_ms: 3000,
        }
    }
}

impl CandidateTrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_seen_count == 0 {
            return Err(Error::invalid("min_seen_count", "must be at least 1"));
        }

        error::check_unit("min_confidence", self.min_confidence)
    }
}

///
/// An object reported under one external tracking id that has not been
/// promoted yet.
///
/// Attributes
/// ----------
/// seen_count : number of observations; never decreases while active.
/// best : category, label and thumbnail of the most confident sighting; its
///     confidence is the running maximum.
/// average_box_area : running mean of normalized box areas.
///
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tracking_id: String,
    pub bbox: Option<BBox<Ltrb>>,
    pub seen_count: u32,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub average_box_area: f32,

    best: ConfidenceGated<Sighting>,
}

impl Candidate {
    pub fn new(tracking_id: &str, detection: &Detection, now_ms: u64) -> Self {
        Self {
            tracking_id: tracking_id.to_string(),
            bbox: detection.valid_bbox(),
            seen_count: 1,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            average_box_area: detection.normalized_area(),
            best: ConfidenceGated::new(Sighting::from(detection), detection.confidence),
        }
    }

    /// Fold one more observation into the candidate.
    pub fn observe(&mut self, detection: &Detection, now_ms: u64) {
        let area = detection.normalized_area();
        self.average_box_area =
            (self.average_box_area * self.seen_count as f32 + area) / (self.seen_count + 1) as f32;
        self.seen_count += 1;
        self.last_seen_ms = now_ms;

        if let Some(bbox) = detection.valid_bbox() {
            self.bbox = Some(bbox);
        }

        self.best.update_sighting(Sighting::from(detection), detection.confidence);
    }

    #[inline]
    pub fn max_confidence(&self) -> f32 {
        self.best.confidence()
    }

    #[inline]
    pub fn category(&self) -> ItemCategory {
        self.best.category()
    }

    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.best.label()
    }

    #[inline]
    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.best.thumbnail()
    }

    /// Seen often enough and confidently enough to promote.
    #[inline]
    pub fn is_ready(&self, config: &CandidateTrackerConfig) -> bool {
        self.seen_count >= config.min_seen_count && self.max_confidence() >= config.min_confidence
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CandidateTrackerStats {
    pub active_candidates: usize,
    pub total_detections: u64,
    pub total_promotions: u64,
    pub total_timeouts: u64,
}

/// Promotes detections that share an external tracking id into confirmed items.
///
/// A candidate is promoted at most once: it leaves the active set on promotion,
/// and a later detection under the same id starts a fresh candidate.
pub struct CandidateTracker<C: Clock = SystemClock, P: PriceEstimator = CategoryPriceTable> {
    config: CandidateTrackerConfig,
    clock: C,
    pricing: P,
    candidates: HashMap<String, Candidate>,
    stats: CandidateTrackerStats,
}

impl CandidateTracker {
    pub fn new(config: CandidateTrackerConfig) -> Self {
        Self::with_parts(config, SystemClock, CategoryPriceTable::default())
    }
}

impl<C: Clock, P: PriceEstimator> CandidateTracker<C, P> {
    pub fn with_parts(config: CandidateTrackerConfig, clock: C, pricing: P) -> Self {
        Self {
            config,
            clock,
            pricing,
            candidates: HashMap::new(),
            stats: CandidateTrackerStats::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &CandidateTrackerConfig {
        &self.config
    }

    /// Record one observation under `tracking_id`.
    ///
    /// Returns the confirmed item when this observation completes the
    /// promotion rule, `None` otherwise.
    pub fn process_detection(&mut self, tracking_id: &str, detection: &Detection) -> Option<ConfirmedItem> {
        let now = self.clock.now_ms();
        self.stats.total_detections += 1;

        let ready = match self.candidates.get_mut(tracking_id) {
            Some(candidate) => {
                candidate.observe(detection, now);
                candidate.is_ready(&self.config)
            }
            None => {
                let candidate = Candidate::new(tracking_id, detection, now);
                debug!(
                    "New candidate {} ({}, conf {:.2})",
                    tracking_id, detection.category, detection.confidence
                );
                let ready = candidate.is_ready(&self.config);
                self.candidates.insert(tracking_id.to_string(), candidate);
                ready
            }
        };

        if ready {
            self.promote(tracking_id, now)
        } else {
            None
        }
    }

    fn promote(&mut self, tracking_id: &str, now_ms: u64) -> Option<ConfirmedItem> {
        let candidate = self.candidates.remove(tracking_id);
        debug_assert!(candidate.is_some(), "promoting unknown candidate {}", tracking_id);
        let candidate = candidate?;

        self.stats.total_promotions += 1;

        let category = candidate.category();
        let price_range = self.pricing.estimate(category, candidate.average_box_area);

        info!(
            "Promoted {} as {} after {} sightings (max conf {:.2})",
            tracking_id,
            category,
            candidate.seen_count,
            candidate.max_confidence()
        );

        let confidence = candidate.max_confidence();
        let best = candidate.best.into_inner();

        Some(ConfirmedItem {
            id: candidate.tracking_id,
            category,
            confidence,
            label: best.label,
            bbox: candidate.bbox,
            box_area: candidate.average_box_area,
            price_range,
            thumbnail: best.thumbnail,
            first_seen_ms: candidate.first_seen_ms,
            confirmed_at_ms: now_ms,
        })
    }

    /// Drop candidates not observed within the configured timeout.
    ///
    /// The tracker has no timer of its own; call this once per processed frame.
    pub fn cleanup_expired_candidates(&mut self) -> usize {
        let now = self.clock.now_ms();
        let timeout = self.config.candidate_timeout_ms;
        let before = self.candidates.len();

        self.candidates
            .retain(|_, c| now.saturating_sub(c.last_seen_ms) <= timeout);

        let removed = before - self.candidates.len();
        if removed > 0 {
            self.stats.total_timeouts += removed as u64;
            debug!("Expired {} stale candidates", removed);
        }

        removed
    }

    #[inline]
    pub fn tick(&mut self) -> usize {
        self.cleanup_expired_candidates()
    }

    #[inline]
    pub fn get_candidate(&self, tracking_id: &str) -> Option<&Candidate> {
        self.candidates.get(tracking_id)
    }

    /// Owned copy of the active candidates.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates.values().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Drop every candidate and zero the counters.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.stats = CandidateTrackerStats::default();
    }

    pub fn stats(&self) -> CandidateTrackerStats {
        CandidateTrackerStats {
            active_candidates: self.candidates.len(),
            ..self.stats
        }
    }
}
