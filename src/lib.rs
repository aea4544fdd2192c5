pub mod config;
pub mod error;
pub mod sync;
pub mod tracking;

pub use config::PipelineConfig;
pub use error::Error;
pub use sync::Shared;
pub use tracking::{
    AggregatedItem, AggregationOutcome, CandidateTrackerStats, CategoryPriceTable, Clock,
    ConfirmedItem, Detection, ItemCategory, ObjectTrackerStats, AggregatorStats, PriceEstimator,
    SystemClock,
};

use tracing::{debug, info};
use tracking::{CandidateTracker, ItemAggregator, ObjectTracker, SessionDeduplicator};

/// Result of offering an item to the visible session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An item with this id is already listed; the first one is kept.
    DuplicateId,
    /// Judged the same physical object as the listed item with this id.
    SimilarTo(String),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PipelineStats {
    pub candidates: CandidateTrackerStats,
    pub objects: ObjectTrackerStats,
    pub aggregation: AggregatorStats,
    pub session_items: usize,
}

/// Detector output in, one stable entry per physical object out.
///
/// Detections carrying a detector tracking id go to the id-keyed
/// [`CandidateTracker`]; the rest go to the spatial [`ObjectTracker`].
/// Promotions from both are consolidated by the [`ItemAggregator`] (when
/// enabled) and finally gated by the [`SessionDeduplicator`].
pub struct ScanPipeline<C: Clock + Clone = SystemClock, P: PriceEstimator + Clone = CategoryPriceTable> {
    config: PipelineConfig,
    candidate_tracker: CandidateTracker<C, P>,
    object_tracker: ObjectTracker<C, P>,
    aggregator: ItemAggregator<C>,
    deduplicator: SessionDeduplicator,
    items: Vec<ConfirmedItem>,
}

impl ScanPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, Error> {
        Self::with_parts(config, SystemClock, CategoryPriceTable::default())
    }
}

impl<C: Clock + Clone, P: PriceEstimator + Clone> ScanPipeline<C, P> {
    pub fn with_parts(config: PipelineConfig, clock: C, pricing: P) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            candidate_tracker: CandidateTracker::with_parts(config.candidate.clone(), clock.clone(), pricing.clone()),
            object_tracker: ObjectTracker::with_parts(config.object.clone(), clock.clone(), pricing),
            aggregator: ItemAggregator::with_clock(config.aggregation.clone(), clock),
            deduplicator: SessionDeduplicator::new(config.dedup.clone()),
            items: Vec::new(),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Feed one frame of detections and run per-frame maintenance.
    ///
    /// Returns the items that entered the session list during this frame.
    pub fn process_frame(&mut self, detections: &[Detection]) -> Vec<ConfirmedItem> {
        let mut promoted = Vec::new();
        let mut anonymous = Vec::new();

        for detection in detections {
            match &detection.tracking_id {
                Some(tracking_id) => {
                    promoted.extend(self.candidate_tracker.process_detection(tracking_id, detection));
                }
                None => anonymous.push(detection.clone()),
            }
        }

        promoted.extend(self.object_tracker.process_frame(&anonymous));

        let added = promoted
            .into_iter()
            .filter_map(|item| self.ingest(item))
            .collect();

        self.tick();

        added
    }

    fn ingest(&mut self, item: ConfirmedItem) -> Option<ConfirmedItem> {
        if self.config.aggregate {
            let (aggregate, outcome) = self.aggregator.process(&item);

            if let AggregationOutcome::Merged { similarity } = outcome {
                debug!(
                    "{} folded into {} (similarity {:.3})",
                    item.id, aggregate.primary_source_id, similarity
                );
                return None;
            }
        }

        match self.add_item(item.clone()) {
            AddOutcome::Added => Some(item),
            _ => None,
        }
    }

    /// Offer an item to the session list. First write wins on ids.
    pub fn add_item(&mut self, item: ConfirmedItem) -> AddOutcome {
        if self.items.iter().any(|i| i.id == item.id) {
            debug!("Ignoring duplicate id {}", item.id);
            return AddOutcome::DuplicateId;
        }

        if let Some(existing) = self.deduplicator.find_similar_item(&item, &self.items) {
            debug!("Rejecting {} as a duplicate of {}", item.id, existing);
            self.deduplicator.remove_item(&item.id);
            return AddOutcome::SimilarTo(existing);
        }

        info!("Session item added: {} ({})", item.id, item.category);
        self.items.push(item);

        AddOutcome::Added
    }

    pub fn remove_item(&mut self, id: &str) -> Option<ConfirmedItem> {
        let idx = self.items.iter().position(|i| i.id == id)?;
        self.deduplicator.remove_item(id);

        Some(self.items.remove(idx))
    }

    /// Periodic maintenance: expire idle candidates and stale aggregates.
    /// Returns how many entities were dropped.
    pub fn tick(&mut self) -> usize {
        let mut removed = self.candidate_tracker.cleanup_expired_candidates();

        if let Some(max_age) = self.config.aggregate_max_age_ms {
            removed += self.aggregator.remove_stale_items(max_age);
        }

        removed
    }

    /// Owned copy of the visible session list.
    #[inline]
    pub fn items(&self) -> Vec<ConfirmedItem> {
        self.items.clone()
    }

    /// Start a new scanning session.
    pub fn reset(&mut self) {
        self.candidate_tracker.clear();
        self.object_tracker.reset();
        self.aggregator.reset();
        self.deduplicator.reset();
        self.items.clear();
        info!("Scan session reset");
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            candidates: self.candidate_tracker.stats(),
            objects: self.object_tracker.get_stats(),
            aggregation: self.aggregator.get_stats(),
            session_items: self.items.len(),
        }
    }
}
