//! Perceptual deduplication of extractor outputs.
//!
//! Observations are visited in a fixed order (adapter order, then descending
//! confidence, then index inside the adapter's result) and greedily joined to
//! the nearest cluster whose representative lies strictly below the
//! threshold. Representatives are confidence-weighted centroids, so an
//! adapter reporting many observations outweighs one reporting a single
//! observation even when that one is more confident. Because centroids move
//! as members arrive, a consolidation pass then merges any representatives
//! that drifted below the threshold of each other, which keeps every emitted
//! pair at least `threshold` apart.

use crate::common::{DistanceMetric, Lab, Rgb8, DEFAULT_JND_THRESHOLD};
use crate::config::AggregationConfig;
use crate::error::AggregationWarning;
use crate::pipeline::types::{
    AggregatedToken, Aggregation, ExtractedColorToken, ExtractionResult, TokenProvenance,
};
use indexmap::IndexSet;
use tracing::{debug, warn};

/// Aggregates with the default metric and the given threshold.
pub fn aggregate(results: &[ExtractionResult], threshold: f32) -> Aggregation {
    ColorAggregator::new(AggregationConfig::default().with_threshold(threshold)).aggregate(results)
}

#[derive(Debug, Clone)]
struct Observation {
    adapter_rank: usize,
    index: usize,
    lab: Lab,
    confidence: f32,
}

#[derive(Debug, Clone)]
struct Cluster {
    /// Indices into the ordered observation list, ascending.
    members: Vec<usize>,
    representative: Lab,
}

pub struct ColorAggregator {
    config: AggregationConfig,
}

impl ColorAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn aggregate(&self, results: &[ExtractionResult]) -> Aggregation {
        let mut warnings = Vec::new();
        let threshold = self.effective_threshold(&mut warnings);
        let metric = self.config.metric;

        let observations = ordered_observations(results, &mut warnings);
        if observations.is_empty() {
            debug!("Nothing to aggregate from {} results", results.len());
            return Aggregation {
                warnings,
                ..Aggregation::empty(threshold, metric)
            };
        }

        let mut clusters = assign_greedily(&observations, threshold, metric);
        let merges = consolidate(&mut clusters, &observations, threshold, metric);

        let tokens: Vec<AggregatedToken> = clusters
            .iter()
            .map(|cluster| build_token(cluster, &observations, results))
            .collect();

        let confidence_sum: f64 = observations.iter().map(|o| o.confidence as f64).sum();
        let overall_confidence =
            ((confidence_sum / observations.len() as f64) as f32).clamp(0.0, 1.0);

        debug!(
            "Aggregated {} observations into {} tokens ({} consolidation merges)",
            observations.len(),
            tokens.len(),
            merges
        );

        Aggregation {
            tokens,
            overall_confidence,
            threshold,
            metric,
            warnings,
        }
    }

    fn effective_threshold(&self, warnings: &mut Vec<AggregationWarning>) -> f32 {
        let requested = self.config.threshold;
        if requested.is_finite() && requested > 0.0 {
            return requested;
        }
        let warning = AggregationWarning::InvalidThreshold {
            requested,
            used: DEFAULT_JND_THRESHOLD,
        };
        warn!("{}", warning);
        warnings.push(warning);
        DEFAULT_JND_THRESHOLD
    }
}

impl Default for ColorAggregator {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}

fn ordered_observations(
    results: &[ExtractionResult],
    warnings: &mut Vec<AggregationWarning>,
) -> Vec<Observation> {
    let mut observations = Vec::new();

    for (adapter_rank, result) in results.iter().enumerate() {
        for (index, token) in result.tokens.iter().enumerate() {
            match validate(token) {
                Ok(lab) => observations.push(Observation {
                    adapter_rank,
                    index,
                    lab,
                    confidence: token.confidence,
                }),
                Err(reason) => {
                    let warning = AggregationWarning::MalformedToken {
                        adapter: result.adapter.clone(),
                        index,
                        reason,
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
    }

    observations.sort_by(|x, y| {
        x.adapter_rank
            .cmp(&y.adapter_rank)
            .then_with(|| y.confidence.total_cmp(&x.confidence))
            .then_with(|| x.index.cmp(&y.index))
    });
    observations
}

/// The token's L*a*b* when finite, else its hex.
fn validate(token: &ExtractedColorToken) -> Result<Lab, String> {
    if !token.confidence.is_finite() || !(0.0..=1.0).contains(&token.confidence) {
        return Err(format!("confidence {} outside [0, 1]", token.confidence));
    }
    if token.lab.is_finite() {
        return Ok(token.lab);
    }
    token
        .hex
        .parse::<Rgb8>()
        .map(|rgb| rgb.to_lab())
        .map_err(|e| format!("no usable color: {}", e))
}

fn assign_greedily(
    observations: &[Observation],
    threshold: f32,
    metric: DistanceMetric,
) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();

    for (position, observation) in observations.iter().enumerate() {
        let mut nearest: Option<(usize, f32)> = None;
        for (i, cluster) in clusters.iter().enumerate() {
            let d = metric.distance(&observation.lab, &cluster.representative);
            if d < threshold && nearest.is_none_or(|(_, best)| d < best) {
                nearest = Some((i, d));
            }
        }

        match nearest {
            Some((i, _)) => {
                let cluster = &mut clusters[i];
                cluster.members.push(position);
                cluster.representative = centroid(&cluster.members, observations);
            }
            None => clusters.push(Cluster {
                members: vec![position],
                representative: observation.lab,
            }),
        }
    }

    clusters
}

/// Merges the closest pair of representatives below `threshold` until none
/// remain. Returns the number of merges.
fn consolidate(
    clusters: &mut Vec<Cluster>,
    observations: &[Observation],
    threshold: f32,
    metric: DistanceMetric,
) -> usize {
    let mut merges = 0;

    loop {
        let mut closest: Option<(usize, usize, f32)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let d = metric.distance(&clusters[i].representative, &clusters[j].representative);
                if d < threshold && closest.is_none_or(|(_, _, best)| d < best) {
                    closest = Some((i, j, d));
                }
            }
        }

        let Some((keep, absorb, _)) = closest else {
            return merges;
        };

        let absorbed = clusters.remove(absorb);
        let cluster = &mut clusters[keep];
        cluster.members.extend(absorbed.members);
        cluster.members.sort_unstable();
        cluster.representative = centroid(&cluster.members, observations);
        merges += 1;
    }
}

/// Confidence-weighted mean; plain mean when every weight is zero.
fn centroid(members: &[usize], observations: &[Observation]) -> Lab {
    let weight_sum: f64 = members
        .iter()
        .map(|&m| observations[m].confidence as f64)
        .sum();
    let uniform = weight_sum <= 0.0;
    let total = if uniform {
        members.len() as f64
    } else {
        weight_sum
    };

    let (mut l, mut a, mut b) = (0f64, 0f64, 0f64);
    for &m in members {
        let o = &observations[m];
        let w = if uniform { 1.0 } else { o.confidence as f64 };
        l += w * o.lab.l as f64;
        a += w * o.lab.a as f64;
        b += w * o.lab.b as f64;
    }

    Lab::new((l / total) as f32, (a / total) as f32, (b / total) as f32)
}

fn build_token(
    cluster: &Cluster,
    observations: &[Observation],
    results: &[ExtractionResult],
) -> AggregatedToken {
    let members: Vec<&Observation> = cluster.members.iter().map(|&m| &observations[m]).collect();

    let mut ranks: Vec<usize> = members.iter().map(|o| o.adapter_rank).collect();
    ranks.sort_unstable();
    ranks.dedup();
    let sources: IndexSet<String> = ranks
        .into_iter()
        .map(|rank| results[rank].adapter.clone())
        .collect();

    let confidence_sum: f64 = members.iter().map(|o| o.confidence as f64).sum();

    AggregatedToken {
        lab: cluster.representative,
        hex: cluster.representative.to_hex(),
        confidence: ((confidence_sum / members.len() as f64) as f32).clamp(0.0, 1.0),
        member_count: members.len(),
        sources: sources.into_iter().collect(),
        members: members
            .iter()
            .map(|o| TokenProvenance {
                adapter: results[o.adapter_rank].adapter.clone(),
                index: o.index,
                confidence: o.confidence,
            })
            .collect(),
    }
}
