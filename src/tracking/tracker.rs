use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{self, Error};
use crate::tracking::similarity::{centroid_distance, iou};
use crate::tracking::{
    CandidateId, CategoryPriceTable, Clock, ConfirmedItem, Detection, ObjectCandidate,
    PriceEstimator, SystemClock,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectTrackerConfig {
    /// Sightings required before a candidate is confirmed.
    pub min_frames_to_confirm: u32,
    /// Best confidence required before a candidate is confirmed.
    pub min_confidence: f32,
    /// Detections below this confidence are dropped before matching.
    pub min_detection_confidence: f32,
    /// Detections with a smaller normalized area are dropped before matching.
    pub min_box_area: f32,
    /// Optional floor on the candidate's average area for confirmation.
    pub confirm_min_box_area: Option<f32>,
    /// Largest sighting gap (in frames) still eligible for spatial re-matching.
    pub max_frame_gap: u64,
    /// Candidates unseen for more frames than this expire.
    pub expiry_frames: u64,
    pub min_match_score: f32,
    pub iou_weight: f32,
    pub distance_weight: f32,
    /// Centroid distance (normalized units) at which the distance term reaches 0.
    pub max_centroid_distance: f32,
}

impl Default for ObjectTrackerConfig {
    fn default() -> Self {
        Self {
            min_frames_to_confirm: 2,
            min_confidence: 0.4,
            min_detection_confidence: 0.1,
            min_box_area: 0.0005,
            confirm_min_box_area: None,
            max_frame_gap: 5,
            expiry_frames: 10,
            min_match_score: 0.3,
            iou_weight: 0.6,
            distance_weight: 0.4,
            max_centroid_distance: 0.2,
        }
    }
}

impl ObjectTrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_frames_to_confirm == 0 {
            return Err(Error::invalid("min_frames_to_confirm", "must be at least 1"));
        }

        error::check_unit("min_confidence", self.min_confidence)?;
        error::check_unit("min_detection_confidence", self.min_detection_confidence)?;
        error::check_unit("min_box_area", self.min_box_area)?;
        error::check_unit("min_match_score", self.min_match_score)?;
        error::check_non_negative("iou_weight", self.iou_weight)?;
        error::check_non_negative("distance_weight", self.distance_weight)?;
        error::check_non_negative("max_centroid_distance", self.max_centroid_distance)?;

        if let Some(area) = self.confirm_min_box_area {
            error::check_unit("confirm_min_box_area", area)?;
        }

        if self.expiry_frames < self.max_frame_gap {
            warn!(
                "expiry_frames ({}) is below max_frame_gap ({}); candidates expire before the gap closes",
                self.expiry_frames, self.max_frame_gap
            );
        }

        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ObjectTrackerStats {
    pub active_candidates: usize,
    pub confirmed_candidates: usize,
    pub current_frame: u64,
    pub total_confirmed: u64,
    pub total_expired: u64,
}

/// Frame-indexed tracker that needs no detector-side identity.
///
/// Parameters
/// ----------
/// config : ObjectTrackerConfig
///     Noise filter, matching and lifecycle thresholds.
/// clock : Clock
///     Source of wall time stamped onto confirmed items.
/// pricing : PriceEstimator
///     Consulted once per confirmation.
///
/// Attributes
/// ----------
/// candidates : arena of live candidates keyed by `CandidateId`.
/// tracking_index : detector id -> candidate, for the matching fast path.
/// current_frame : incremented once per `process_frame` call.
///
pub struct ObjectTracker<C: Clock = SystemClock, P: PriceEstimator = CategoryPriceTable> {
    config: ObjectTrackerConfig,
    clock: C,
    pricing: P,
    candidates: HashMap<CandidateId, ObjectCandidate>,
    tracking_index: HashMap<String, CandidateId>,
    current_frame: u64,
    next_id: u64,
    total_confirmed: u64,
    total_expired: u64,
}

impl ObjectTracker {
    pub fn new(config: ObjectTrackerConfig) -> Self {
        Self::with_parts(config, SystemClock, CategoryPriceTable::default())
    }
}

impl<C: Clock, P: PriceEstimator> ObjectTracker<C, P> {
    pub fn with_parts(config: ObjectTrackerConfig, clock: C, pricing: P) -> Self {
        Self {
            config,
            clock,
            pricing,
            candidates: HashMap::new(),
            tracking_index: HashMap::new(),
            current_frame: 0,
            next_id: 1,
            total_confirmed: 0,
            total_expired: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &ObjectTrackerConfig {
        &self.config
    }

    #[inline]
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Advance one frame: match every detection, then expire stale candidates.
    ///
    /// Returns the items confirmed during this frame; each candidate is
    /// reported at most once over its lifetime.
    pub fn process_frame(&mut self, detections: &[Detection]) -> Vec<ConfirmedItem> {
        self.current_frame += 1;
        let frame = self.current_frame;
        let now = self.clock.now_ms();

        let mut matched: HashSet<CandidateId> = HashSet::new();
        let mut confirmed = Vec::new();

        for detection in detections {
            if !self.passes_filter(detection) {
                continue;
            }

            let id = match self.find_match(detection, &matched) {
                Some(id) => {
                    if let Some(candidate) = self.candidates.get_mut(&id) {
                        candidate.update(detection, frame);
                    }
                    id
                }
                None => self.initiate_candidate(detection, frame, now),
            };

            matched.insert(id);

            if let Some(tracking_id) = &detection.tracking_id {
                self.tracking_index.insert(tracking_id.clone(), id);
            }

            if let Some(item) = self.try_confirm(id, now) {
                confirmed.push(item);
            }
        }

        self.expire_stale();

        confirmed
    }

    fn passes_filter(&self, detection: &Detection) -> bool {
        if detection.confidence < self.config.min_detection_confidence {
            debug!("Dropping low-confidence detection ({:.2})", detection.confidence);
            return false;
        }

        let area = detection.normalized_area();
        if area < self.config.min_box_area {
            debug!("Dropping tiny detection (area {:.5})", area);
            return false;
        }

        true
    }

    fn find_match(&self, detection: &Detection, matched: &HashSet<CandidateId>) -> Option<CandidateId> {
        // Detector id fast path.
        if let Some(tracking_id) = &detection.tracking_id {
            let hit = self
                .tracking_index
                .get(tracking_id)
                .and_then(|id| self.candidates.get(id))
                .filter(|c| !matched.contains(&c.id))
                .filter(|c| c.last_tracking_id.as_deref() == Some(tracking_id.as_str()));

            if let Some(candidate) = hit {
                return Some(candidate.id);
            }
        }

        let mut best: Option<(&ObjectCandidate, f32)> = None;

        for candidate in self.candidates.values() {
            if matched.contains(&candidate.id)
                || candidate.is_expired()
                || candidate.frames_since_seen(self.current_frame) > self.config.max_frame_gap
            {
                continue;
            }

            let score = self.match_score(candidate, detection);
            if score < self.config.min_match_score {
                continue;
            }

            let better = match best {
                None => true,
                Some((current, best_score)) => {
                    score > best_score
                        || (score == best_score
                            && (candidate.last_seen_frame, std::cmp::Reverse(candidate.id))
                                > (current.last_seen_frame, std::cmp::Reverse(current.id)))
                }
            };

            if better {
                best = Some((candidate, score));
            }
        }

        best.map(|(candidate, score)| {
            debug!("Detection matched {} (score {:.3})", candidate.id, score);
            candidate.id
        })
    }

    /// Weighted IoU + centroid proximity; 0 on category mismatch or missing boxes.
    pub fn match_score(&self, candidate: &ObjectCandidate, detection: &Detection) -> f32 {
        if candidate.category() != detection.category {
            return 0.0;
        }

        let (a, b) = match (candidate.bbox.as_ref(), detection.valid_bbox()) {
            (Some(a), Some(b)) => (*a, b),
            _ => return 0.0,
        };

        let total = self.config.iou_weight + self.config.distance_weight;
        if total <= 0.0 {
            warn!("All object-tracker match weights are zero; treating as no match");
            return 0.0;
        }

        let proximity = if self.config.max_centroid_distance > 0.0 {
            1.0 - (centroid_distance(&a, &b) / self.config.max_centroid_distance).min(1.0)
        } else {
            0.0
        };

        (self.config.iou_weight * iou(&a, &b) + self.config.distance_weight * proximity) / total
    }

    fn initiate_candidate(&mut self, detection: &Detection, frame: u64, now_ms: u64) -> CandidateId {
        let id = CandidateId(self.next_id);
        self.next_id += 1;

        debug!(
            "New candidate {} ({}, conf {:.2}) at frame {}",
            id, detection.category, detection.confidence, frame
        );

        self.candidates
            .insert(id, ObjectCandidate::new(id, detection, frame, now_ms));

        id
    }

    fn try_confirm(&mut self, id: CandidateId, now_ms: u64) -> Option<ConfirmedItem> {
        let config = &self.config;
        let candidate = self.candidates.get_mut(&id)?;

        if candidate.is_confirmed()
            || candidate.seen_count < config.min_frames_to_confirm
            || candidate.max_confidence() < config.min_confidence
            || config
                .confirm_min_box_area
                .map_or(false, |min| candidate.average_box_area < min)
        {
            return None;
        }

        candidate.mark_confirmed();
        self.total_confirmed += 1;

        info!(
            "Confirmed {} as {} after {} sightings (max conf {:.2})",
            candidate.id,
            candidate.category(),
            candidate.seen_count,
            candidate.max_confidence()
        );

        let category = candidate.category();

        Some(ConfirmedItem {
            id: candidate.id.to_string(),
            category,
            label: candidate.label().map(str::to_string),
            confidence: candidate.max_confidence(),
            bbox: candidate.bbox,
            box_area: candidate.average_box_area,
            price_range: self.pricing.estimate(category, candidate.average_box_area),
            thumbnail: candidate.thumbnail().cloned(),
            first_seen_ms: candidate.first_seen_ms,
            confirmed_at_ms: now_ms,
        })
    }

    fn expire_stale(&mut self) {
        let frame = self.current_frame;
        let expiry = self.config.expiry_frames;

        let stale: Vec<CandidateId> = self
            .candidates
            .values()
            .filter(|c| c.frames_since_seen(frame) > expiry)
            .map(|c| c.id)
            .collect();

        for id in stale {
            if let Some(mut candidate) = self.candidates.remove(&id) {
                candidate.mark_expired();
                self.total_expired += 1;
                debug!("Candidate {} expired after frame {}", candidate.id, candidate.last_seen_frame);
            }
        }

        if !self.tracking_index.is_empty() {
            let candidates = &self.candidates;
            self.tracking_index.retain(|_, id| candidates.contains_key(id));
        }
    }

    #[inline]
    pub fn get_candidate(&self, id: CandidateId) -> Option<&ObjectCandidate> {
        self.candidates.get(&id)
    }

    /// Owned copy of the live candidates, ordered by id.
    pub fn candidates(&self) -> Vec<ObjectCandidate> {
        let mut out: Vec<_> = self.candidates.values().cloned().collect();
        out.sort_by_key(|c| c.id);
        out
    }

    pub fn confirmed_candidates(&self) -> Vec<ObjectCandidate> {
        let mut out: Vec<_> = self
            .candidates
            .values()
            .filter(|c| c.is_confirmed())
            .cloned()
            .collect();
        out.sort_by_key(|c| c.id);
        out
    }

    /// Drop every candidate and restart frame numbering. Candidate ids keep
    /// increasing so items from an earlier session never collide.
    pub fn reset(&mut self) {
        self.candidates.clear();
        self.tracking_index.clear();
        self.current_frame = 0;
        self.total_confirmed = 0;
        self.total_expired = 0;
        info!("Object tracker reset");
    }

    pub fn get_stats(&self) -> ObjectTrackerStats {
        ObjectTrackerStats {
            active_candidates: self.candidates.len(),
            confirmed_candidates: self.candidates.values().filter(|c| c.is_confirmed()).count(),
            current_frame: self.current_frame,
            total_confirmed: self.total_confirmed,
            total_expired: self.total_expired,
        }
    }
}
