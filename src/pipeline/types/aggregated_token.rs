use crate::common::{DistanceMetric, Lab};
use crate::error::AggregationWarning;
use serde::Serialize;

/// Points back at one input observation of an aggregated token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenProvenance {
    pub adapter: String,
    /// Position of the token inside its adapter's result.
    pub index: usize,
    pub confidence: f32,
}

/// One deduplicated color, representing every observation in its cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedToken {
    pub lab: Lab,
    pub hex: String,
    /// Mean confidence of the members.
    pub confidence: f32,
    pub member_count: usize,
    /// Contributing adapters, in adapter order.
    pub sources: Vec<String>,
    pub members: Vec<TokenProvenance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub tokens: Vec<AggregatedToken>,
    pub overall_confidence: f32,
    pub threshold: f32,
    pub metric: DistanceMetric,
    pub warnings: Vec<AggregationWarning>,
}

impl Aggregation {
    pub fn empty(threshold: f32, metric: DistanceMetric) -> Self {
        Self {
            tokens: Vec::new(),
            overall_confidence: 0.0,
            threshold,
            metric,
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Smallest distance between any two emitted tokens.
    pub fn min_pairwise_distance(&self) -> Option<f32> {
        let mut min: Option<f32> = None;
        for (i, x) in self.tokens.iter().enumerate() {
            for y in &self.tokens[i + 1..] {
                let d = self.metric.distance(&x.lab, &y.lab);
                min = Some(min.map_or(d, |m| m.min(d)));
            }
        }
        min
    }
}
