use std::fmt;

use crate::tracking::{BBox, ConfidenceGated, Detection, ItemCategory, Ltrb, Sighting, Thumbnail};

/// Arena handle of an object-tracker candidate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub u64);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

///
/// Lifecycle of a spatially tracked candidate. A candidate starts as `New`,
/// becomes `Tracked` on its second sighting and `Confirmed` once it passes the
/// promotion rule. `Expired` is terminal and marks it for removal.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CandidateState {
    New,
    Tracked,
    Confirmed,
    Expired,
}

///
/// A single object followed across frames without relying on a detector id.
///
/// Attributes
/// ----------
/// last_tracking_id : detector id seen on the latest sighting, used as a
///     matching fast path.
/// seen_count : total number of matched detections.
/// first_seen_frame, last_seen_frame : frame numbers of the first and latest
///     sighting.
/// average_box_area : running mean of normalized box areas.
///
#[derive(Debug, Clone)]
pub struct ObjectCandidate {
    pub id: CandidateId,
    pub bbox: Option<BBox<Ltrb>>,
    pub last_tracking_id: Option<String>,
    pub seen_count: u32,
    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
    pub first_seen_ms: u64,
    pub average_box_area: f32,

    state: CandidateState,
    best: ConfidenceGated<Sighting>,
}

impl ObjectCandidate {
    pub fn new(id: CandidateId, detection: &Detection, frame: u64, now_ms: u64) -> Self {
        Self {
            id,
            bbox: detection.valid_bbox(),
            last_tracking_id: detection.tracking_id.clone(),
            seen_count: 1,
            first_seen_frame: frame,
            last_seen_frame: frame,
            first_seen_ms: now_ms,
            average_box_area: detection.normalized_area(),
            state: CandidateState::New,
            best: ConfidenceGated::new(Sighting::from(detection), detection.confidence),
        }
    }

    /// Fold a matched detection into the candidate.
    pub fn update(&mut self, detection: &Detection, frame: u64) {
        let area = detection.normalized_area();
        self.average_box_area =
            (self.average_box_area * self.seen_count as f32 + area) / (self.seen_count + 1) as f32;
        self.seen_count += 1;
        self.last_seen_frame = frame;

        if let Some(bbox) = detection.valid_bbox() {
            self.bbox = Some(bbox);
        }

        if detection.tracking_id.is_some() {
            self.last_tracking_id = detection.tracking_id.clone();
        }

        self.best.update_sighting(Sighting::from(detection), detection.confidence);

        if self.state == CandidateState::New {
            self.state = CandidateState::Tracked;
        }
    }

    #[inline]
    pub fn state(&self) -> CandidateState {
        self.state
    }

    #[inline]
    pub fn mark_confirmed(&mut self) {
        debug_assert!(self.state != CandidateState::Expired);
        self.state = CandidateState::Confirmed;
    }

    #[inline]
    pub fn mark_expired(&mut self) {
        self.state = CandidateState::Expired;
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == CandidateState::Confirmed
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.state == CandidateState::Expired
    }

    #[inline]
    pub fn frames_since_seen(&self, current_frame: u64) -> u64 {
        current_frame.saturating_sub(self.last_seen_frame)
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
}
