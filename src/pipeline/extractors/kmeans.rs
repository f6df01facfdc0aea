use super::{ColorExtractor, ExtractionOptions};
use crate::common::{delta_e76, ImageFrame, Lab, Rgb8};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::pipeline::types::{ExtractedColorToken, ExtractionResult};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::debug;

const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Clustering extractor: seeded k-means++ over sampled pixels in L*a*b*.
pub struct KMeansExtractor {
    name: String,
    max_iterations: usize,
}

struct Cluster {
    center: Lab,
    count: usize,
}

impl KMeansExtractor {
    pub fn new() -> Self {
        Self::named("kmeans")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn cluster(
        &self,
        samples: &[Lab],
        options: &ExtractionOptions,
    ) -> Result<Vec<ExtractedColorToken>, AdapterErrorKind> {
        if samples.is_empty() || options.max_colors == 0 {
            return Ok(Vec::new());
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut centers = seed_centers(samples, options.max_colors, &mut rng);
        let mut assignments = vec![usize::MAX; samples.len()];

        for iteration in 0..self.max_iterations {
            if options.cancellation.is_cancelled() {
                return Err(AdapterErrorKind::Cancelled);
            }

            let mut changed = false;
            for (sample, assigned) in samples.iter().zip(assignments.iter_mut()) {
                let nearest = nearest_center(sample, &centers);
                if *assigned != nearest {
                    *assigned = nearest;
                    changed = true;
                }
            }

            if !changed {
                debug!("{} converged after {} iterations", self.name, iteration);
                break;
            }

            let mut sums = vec![(0f64, 0f64, 0f64, 0usize); centers.len()];
            for (sample, &assigned) in samples.iter().zip(&assignments) {
                let sum = &mut sums[assigned];
                sum.0 += sample.l as f64;
                sum.1 += sample.a as f64;
                sum.2 += sample.b as f64;
                sum.3 += 1;
            }
            for (center, (l, a, b, n)) in centers.iter_mut().zip(sums) {
                // Empty clusters keep their previous center.
                if n > 0 {
                    let n = n as f64;
                    *center = Lab::new((l / n) as f32, (a / n) as f32, (b / n) as f32);
                }
            }
        }

        let mut clusters: Vec<Cluster> = centers
            .into_iter()
            .map(|center| Cluster { center, count: 0 })
            .collect();
        for &assigned in &assignments {
            clusters[assigned].count += 1;
        }
        clusters.retain(|c| c.count > 0);
        clusters.sort_by(|x, y| {
            y.count
                .cmp(&x.count)
                .then_with(|| x.center.total_cmp(&y.center))
        });

        let total = samples.len() as f32;
        Ok(clusters
            .iter()
            .take(options.max_colors)
            .map(|c| {
                let share = c.count as f32 / total;
                ExtractedColorToken::from_lab(c.center, share.sqrt().min(1.0), &self.name)
            })
            .collect())
    }
}

impl Default for KMeansExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn nearest_center(sample: &Lab, centers: &[Lab]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = delta_e76(sample, center);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// k-means++ seeding. Returns fewer than `k` centers when the samples hold
/// fewer distinct colors.
fn seed_centers(samples: &[Lab], k: usize, rng: &mut StdRng) -> Vec<Lab> {
    let mut centers = vec![samples[rng.random_range(0..samples.len())]];

    while centers.len() < k {
        let weights: Vec<f64> = samples
            .iter()
            .map(|s| {
                let d = delta_e76(s, &centers[nearest_center(s, &centers)]) as f64;
                d * d
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            break;
        }

        let mut target = rng.random::<f64>() * total;
        let mut chosen = weights
            .iter()
            .rposition(|w| *w > 0.0)
            .unwrap_or(samples.len() - 1);
        for (i, w) in weights.iter().enumerate() {
            if *w > 0.0 && target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centers.push(samples[chosen]);
    }

    centers
}

#[async_trait]
impl ColorExtractor for KMeansExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        image: &[u8],
        options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError> {
        let started = Instant::now();
        let bytes = image.to_vec();
        let options = options.clone();
        let worker = Self {
            name: self.name.clone(),
            max_iterations: self.max_iterations,
        };

        let tokens = tokio::task::spawn_blocking(move || {
            let frame = ImageFrame::decode(&bytes)
                .map_err(|e| AdapterErrorKind::Decode(e.to_string()))?;
            let samples: Vec<Lab> = frame
                .sampled_pixels(options.sample_step)
                .map(|px| Rgb8::new(px[0], px[1], px[2]).to_lab())
                .collect();
            worker.cluster(&samples, &options)
        })
        .await
        .map_err(|e| AdapterError::new(&self.name, AdapterErrorKind::Panicked(e.to_string())))?
        .map_err(|kind| AdapterError::new(&self.name, kind))?;

        debug!("{} extracted {} colors", self.name, tokens.len());
        Ok(ExtractionResult::finish(&self.name, tokens, started))
    }
}
