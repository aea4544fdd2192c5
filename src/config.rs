use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Error;
use crate::tracking::{
    AggregationConfig, AggregationPreset, CandidateTrackerConfig, DedupConfig, ObjectTrackerConfig,
};

/// Settings for a whole [`ScanPipeline`](crate::ScanPipeline).
///
/// Every section is optional in a JSON document; omitted fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub candidate: CandidateTrackerConfig,
    pub object: ObjectTrackerConfig,
    pub aggregation: AggregationConfig,
    pub dedup: DedupConfig,
    /// Route promotions through the aggregator before the session gate.
    pub aggregate: bool,
    /// Evict aggregates idle for longer than this on every tick.
    pub aggregate_max_age_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidate: CandidateTrackerConfig::default(),
            object: ObjectTrackerConfig::default(),
            aggregation: AggregationConfig::default(),
            dedup: DedupConfig::default(),
            aggregate: true,
            aggregate_max_age_ms: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        info!("Loaded pipeline config (aggregate: {})", config.aggregate);

        Ok(config)
    }

    pub fn with_aggregation_preset(mut self, preset: AggregationPreset) -> Self {
        self.aggregation = preset.into();
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.candidate.validate()?;
        self.object.validate()?;
        self.aggregation.validate()?;
        self.dedup.validate()
    }
}
