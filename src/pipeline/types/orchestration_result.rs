use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ExtractorFailure;
use crate::pipeline::orchestration::PhaseTimings;
use crate::pipeline::types::{Aggregation, ExtractionResult};

/// Outcome of one `extract_all` call with at least one successful extractor.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub image_id: String,
    pub started_at: DateTime<Utc>,
    /// Successful results keyed by extractor name, in registry order.
    pub successes: IndexMap<String, ExtractionResult>,
    /// Failed extractors, in registry order.
    pub failures: Vec<ExtractorFailure>,
    pub aggregated_colors: Aggregation,
    pub overall_confidence: f32,
    pub timings: PhaseTimings,
}

impl OrchestrationResult {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_adapters(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.adapter.as_str()).collect()
    }
}
