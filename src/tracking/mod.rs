pub mod aggregator;
pub mod candidate;
pub mod clock;
pub mod dedup;
pub mod detection;
pub mod gated;
pub mod pricing;
pub mod similarity;
pub mod track;
pub mod tracker;

pub use aggregator::{AggregatedItem, AggregationConfig, AggregationOutcome, AggregationPreset, AggregatorStats, ItemAggregator, SimilarityWeights};
pub use candidate::{Candidate, CandidateTracker, CandidateTrackerConfig, CandidateTrackerStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{DedupConfig, SessionDeduplicator, SessionRecord};
pub use detection::{ConfirmedItem, Detection, ItemCategory, Thumbnail};
pub use gated::{ConfidenceGated, Sighting};
pub use pricing::{CategoryPriceTable, PriceEstimator, PriceRange};
pub use track::{CandidateId, CandidateState, ObjectCandidate};
pub use tracker::{ObjectTracker, ObjectTrackerConfig, ObjectTrackerStats};

use core::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug {}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// Axis-aligned box tagged with its coordinate layout.
///
/// The pipeline works in normalized `[0, 1]` frame coordinates; pixel rects
/// coming from a detector go through [`BBox::from_pixels`] first.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_array(&self) -> [f32; 4] {
        self.0
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox(
            [x1, x2, x3, x4],
            Default::default(),
        )
    }

    /// Normalizes a pixel rect `(left, top, right, bottom)` against the frame size.
    pub fn from_pixels(rect: [f32; 4], frame_width: f32, frame_height: f32) -> Self {
        if frame_width <= 0.0 || frame_height <= 0.0 {
            return Self::ltrb(0.0, 0.0, 0.0, 0.0);
        }

        Self::ltrb(
            rect[0] / frame_width,
            rect[1] / frame_height,
            rect[2] / frame_width,
            rect[3] / frame_height,
        )
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        (self.right() - self.left()).max(0.0)
    }

    #[inline]
    pub fn height(&self) -> f32 {
        (self.bottom() - self.top()).max(0.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.left() + self.right()) / 2.0,
            (self.top() + self.bottom()) / 2.0,
        )
    }

    /// Finite coordinates and non-negative extent.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
            && self.right() >= self.left()
            && self.bottom() >= self.top()
    }
}
