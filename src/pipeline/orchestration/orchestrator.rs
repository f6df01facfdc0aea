use super::{OrchestrationPhase, PhaseTimings};
use crate::config::{Configuration, OrchestratorConfig};
use crate::error::{AdapterError, AdapterErrorKind, ExtractorFailure, OrchestrationError};
use crate::pipeline::aggregation::ColorAggregator;
use crate::pipeline::extractors::{
    ColorExtractor, ExtractionOptions, ExtractionRequest, ExtractorRegistry, ExtractorService,
};
use crate::pipeline::types::{ExtractionResult, OrchestrationResult};
use chrono::Utc;
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tower::timeout::error::Elapsed;
use tower::{BoxError, ServiceBuilder, ServiceExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

type TaskOutcome = (Result<ExtractionResult, AdapterError>, Duration);

/// Runs every extractor in a registry against one image and aggregates the
/// successful results.
pub struct ExtractionOrchestrator {
    configuration: Configuration,
}

impl ExtractionOrchestrator {
    pub fn new(configuration: Configuration) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    #[instrument(skip(self, image, registry), fields(image_id = %image_id, extractors = registry.len()))]
    pub async fn extract_all(
        &self,
        image: &[u8],
        image_id: &str,
        registry: &ExtractorRegistry,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut timings = PhaseTimings::new();
        let mut phase = OrchestrationPhase::Idle;

        let admitted = self.admit(registry)?;
        if admitted.is_empty() {
            warn!("No extractors registered for image '{}'", image_id);
            return Err(OrchestrationError::AllExtractorsFailed {
                image_id: image_id.to_string(),
                failures: Vec::new(),
            });
        }

        phase = advance(phase, &mut timings);
        let timeout = self.configuration.orchestrator.per_adapter_timeout();
        let base_options = ExtractionOptions::from(&self.configuration.extraction);
        let image: Arc<[u8]> = Arc::from(image);

        let handles: Vec<_> = admitted
            .iter()
            .map(|(name, extractor)| {
                spawn_extractor(
                    name.clone(),
                    extractor.clone(),
                    image.clone(),
                    base_options.child(),
                    timeout,
                )
            })
            .collect();
        debug!("Spawned {} extractor tasks (run {})", handles.len(), run_id);

        let joined = join_all(handles).await;
        phase = advance(phase, &mut timings);

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for ((name, _), joined) in admitted.iter().zip(joined) {
            let (outcome, elapsed) = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => (Err(from_join_error(name, join_error)), Duration::ZERO),
            };
            timings.record_extractor(name.as_str(), elapsed);

            match outcome {
                Ok(result) => {
                    debug!(
                        "Extractor '{}' produced {} tokens in {}us",
                        name,
                        result.tokens.len(),
                        elapsed.as_micros()
                    );
                    successes.push(result.attributed_to(name));
                }
                Err(error) => {
                    warn!("Extractor '{}' failed: {}", name, error.kind);
                    failures.push(ExtractorFailure {
                        adapter: name.clone(),
                        error,
                    });
                }
            }
        }

        if successes.is_empty() {
            warn!(
                "All {} extractors failed for image '{}'",
                failures.len(),
                image_id
            );
            return Err(OrchestrationError::AllExtractorsFailed {
                image_id: image_id.to_string(),
                failures,
            });
        }

        phase = advance(phase, &mut timings);
        let aggregated_colors =
            ColorAggregator::new(self.configuration.aggregation).aggregate(&successes);
        advance(phase, &mut timings);

        let successes: IndexMap<String, ExtractionResult> = successes
            .into_iter()
            .map(|result| (result.adapter.clone(), result))
            .collect();

        info!(
            "Image '{}': {} tokens from {}/{} extractors in {}us",
            image_id,
            aggregated_colors.len(),
            successes.len(),
            admitted.len(),
            timings.total().as_micros()
        );

        Ok(OrchestrationResult {
            run_id,
            image_id: image_id.to_string(),
            started_at,
            overall_confidence: aggregated_colors.overall_confidence,
            aggregated_colors,
            successes,
            failures,
            timings,
        })
    }

    /// Applies the safe-mode rules and settles the name each extractor is
    /// reported under.
    fn admit(
        &self,
        registry: &ExtractorRegistry,
    ) -> Result<Vec<(String, Arc<dyn ColorExtractor>)>, OrchestrationError> {
        let config = &self.configuration.orchestrator;

        if config.safe_mode && registry.len() > config.max_extractors {
            return Err(OrchestrationError::TooManyExtractors {
                limit: config.max_extractors,
                requested: registry.len(),
            });
        }

        let mut taken: IndexSet<String> = IndexSet::new();
        let mut admitted = Vec::with_capacity(registry.len());
        for extractor in registry.iter() {
            let base = extractor.name();
            let name = if !taken.contains(base) {
                base.to_string()
            } else if config.safe_mode {
                return Err(OrchestrationError::DuplicateExtractor(base.to_string()));
            } else {
                let unique = (2..)
                    .map(|n| format!("{}#{}", base, n))
                    .find(|candidate| !taken.contains(candidate))
                    .unwrap_or_else(|| format!("{}#{}", base, taken.len() + 1));
                warn!("Duplicate extractor '{}' renamed to '{}'", base, unique);
                unique
            };
            taken.insert(name.clone());
            admitted.push((name, extractor.clone()));
        }

        Ok(admitted)
    }
}

impl Default for ExtractionOrchestrator {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

/// Runs `registry` with the given orchestrator settings and default
/// extraction and aggregation settings.
pub async fn extract_all(
    image: &[u8],
    image_id: &str,
    registry: &ExtractorRegistry,
    config: &OrchestratorConfig,
) -> Result<OrchestrationResult, OrchestrationError> {
    ExtractionOrchestrator::new(Configuration::default().with_orchestrator(config.clone()))
        .extract_all(image, image_id, registry)
        .await
}

fn advance(phase: OrchestrationPhase, timings: &mut PhaseTimings) -> OrchestrationPhase {
    timings.exit_phase(phase);
    let next = phase.next();
    if next != OrchestrationPhase::Done {
        timings.entry_phase(next);
    }
    debug!("Orchestration phase {} -> {}", phase, next);
    next
}

fn spawn_extractor(
    name: String,
    extractor: Arc<dyn ColorExtractor>,
    image: Arc<[u8]>,
    options: ExtractionOptions,
    timeout: Duration,
) -> tokio::task::JoinHandle<TaskOutcome> {
    let cancellation = options.cancellation.clone();
    let service = ServiceBuilder::new()
        .timeout(timeout)
        .service(ExtractorService::new(extractor));

    tokio::spawn(async move {
        let started = Instant::now();
        let outcome = service
            .oneshot(ExtractionRequest { image, options })
            .await
            .map_err(|error| {
                let error = classify(&name, timeout, error);
                if error.is_timeout() {
                    cancellation.cancel();
                }
                error
            });
        (outcome, started.elapsed())
    })
}

fn classify(name: &str, timeout: Duration, error: BoxError) -> AdapterError {
    if error.is::<Elapsed>() {
        return AdapterError::new(name, AdapterErrorKind::Timeout(timeout));
    }
    match error.downcast::<AdapterError>() {
        Ok(adapter_error) => AdapterError::new(name, adapter_error.kind),
        Err(other) => AdapterError::new(name, AdapterErrorKind::Other(other.to_string())),
    }
}

fn from_join_error(name: &str, error: JoinError) -> AdapterError {
    if error.is_panic() {
        let message = panic_message(error.into_panic());
        AdapterError::new(name, AdapterErrorKind::Panicked(message))
    } else {
        AdapterError::new(name, AdapterErrorKind::Cancelled)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::encode_png;
    use crate::pipeline::aggregation::aggregate;
    use crate::pipeline::extractors::test_support::{
        FailingExtractor, PanickingExtractor, StaticExtractor,
    };
    use crate::pipeline::extractors::ExtractorFactory;
    use image::{Rgb, RgbImage};

    const IMAGE: &[u8] = b"not decoded by fakes";

    fn config(timeout_ms: u64) -> OrchestratorConfig {
        OrchestratorConfig::default().with_timeout_ms(timeout_ms)
    }

    #[tokio::test]
    async fn runs_extractors_concurrently() {
        let delay = Duration::from_millis(300);
        let registry = ExtractorRegistry::new()
            .register(StaticExtractor::new("a", &[("#FF0000", 0.9)]).with_delay(delay))
            .register(StaticExtractor::new("b", &[("#00FF00", 0.8)]).with_delay(delay))
            .register(StaticExtractor::new("c", &[("#0000FF", 0.7)]).with_delay(delay));

        let started = Instant::now();
        let result = extract_all(IMAGE, "img", &registry, &config(5_000))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.successes.len(), 3);
        assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");
        assert_eq!(result.aggregated_colors.len(), 3);
    }

    #[tokio::test]
    async fn timed_out_extractor_is_reported_and_excluded() {
        let c = StaticExtractor::new("C", &[("#FF0000", 0.9), ("#00FF00", 0.6)]);
        let expected = aggregate(&[c.result()], 2.3);
        let registry = ExtractorRegistry::new()
            .register(
                StaticExtractor::new("K", &[("#0000FF", 1.0)]).with_delay(Duration::from_secs(5)),
            )
            .register(c);

        let result = extract_all(IMAGE, "img", &registry, &config(100))
            .await
            .unwrap();

        assert_eq!(result.failed_adapters(), vec!["K"]);
        assert!(result.failures[0].error.is_timeout());
        assert_eq!(
            result.failures[0].error.kind,
            AdapterErrorKind::Timeout(Duration::from_millis(100))
        );
        assert_eq!(result.successes.keys().collect::<Vec<_>>(), vec!["C"]);
        assert_eq!(result.aggregated_colors, expected);
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn failing_extractor_does_not_change_the_aggregation() {
        let a = StaticExtractor::new("A", &[("#123456", 0.7), ("#ABCDEF", 0.4)]);
        let alone = ExtractorRegistry::new().register(StaticExtractor::new(
            "A",
            &[("#123456", 0.7), ("#ABCDEF", 0.4)],
        ));
        let with_failure = ExtractorRegistry::new()
            .register(a)
            .register(FailingExtractor::new("B", "connection refused"));

        let baseline = extract_all(IMAGE, "img", &alone, &config(1_000))
            .await
            .unwrap();
        let result = extract_all(IMAGE, "img", &with_failure, &config(1_000))
            .await
            .unwrap();

        assert_eq!(result.aggregated_colors, baseline.aggregated_colors);
        assert_eq!(result.overall_confidence, baseline.overall_confidence);
        assert_eq!(result.failures[0].adapter, "B");
        assert_eq!(
            result.failures[0].error.kind,
            AdapterErrorKind::Remote("connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn panicking_extractor_is_isolated() {
        let registry = ExtractorRegistry::new()
            .register(PanickingExtractor)
            .register(StaticExtractor::new("ok", &[("#808080", 0.5)]));

        let result = extract_all(IMAGE, "img", &registry, &config(1_000))
            .await
            .unwrap();

        assert_eq!(result.successes.len(), 1);
        assert_eq!(result.failures[0].adapter, "panics");
        assert_eq!(
            result.failures[0].error.kind,
            AdapterErrorKind::Panicked("extractor blew up".to_string())
        );
    }

    #[tokio::test]
    async fn zero_successes_is_an_error() {
        let registry = ExtractorRegistry::new()
            .register(FailingExtractor::new("x", "down"))
            .register(PanickingExtractor);

        let error = extract_all(IMAGE, "img-7", &registry, &config(1_000))
            .await
            .unwrap_err();

        match error {
            OrchestrationError::AllExtractorsFailed { image_id, failures } => {
                assert_eq!(image_id, "img-7");
                let names: Vec<_> = failures.iter().map(|f| f.adapter.as_str()).collect();
                assert_eq!(names, vec!["x", "panics"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_registry_is_an_error() {
        let error = extract_all(IMAGE, "img", &ExtractorRegistry::new(), &config(1_000))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            OrchestrationError::AllExtractorsFailed { ref failures, .. } if failures.is_empty()
        ));
    }

    #[tokio::test]
    async fn safe_mode_caps_extractor_count() {
        let registry = ExtractorRegistry::new()
            .register(StaticExtractor::new("a", &[]))
            .register(StaticExtractor::new("b", &[]));

        let error = extract_all(
            IMAGE,
            "img",
            &registry,
            &config(1_000).with_max_extractors(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            error,
            OrchestrationError::TooManyExtractors {
                limit: 1,
                requested: 2
            }
        ));
    }

    #[tokio::test]
    async fn safe_mode_rejects_duplicate_names() {
        let registry = ExtractorRegistry::new()
            .register(StaticExtractor::new("a", &[("#FFFFFF", 0.5)]))
            .register(StaticExtractor::new("a", &[("#000000", 0.5)]));

        let error = extract_all(IMAGE, "img", &registry, &config(1_000))
            .await
            .unwrap_err();
        assert!(matches!(error, OrchestrationError::DuplicateExtractor(ref name) if name == "a"));
    }

    #[tokio::test]
    async fn duplicates_are_renamed_outside_safe_mode() {
        let registry = ExtractorRegistry::new()
            .register(StaticExtractor::new("a", &[("#FFFFFF", 0.5)]))
            .register(StaticExtractor::new("a", &[("#000000", 0.5)]))
            .register(StaticExtractor::new("a", &[("#FF00FF", 0.5)]));

        let result = extract_all(
            IMAGE,
            "img",
            &registry,
            &config(1_000).with_safe_mode(false).with_max_extractors(1),
        )
        .await
        .unwrap();

        assert_eq!(
            result.successes.keys().collect::<Vec<_>>(),
            vec!["a", "a#2", "a#3"]
        );
        assert_eq!(result.successes["a#2"].adapter, "a#2");
        assert_eq!(result.successes["a#2"].tokens[0].source, "a#2");
        assert_eq!(result.aggregated_colors.tokens[1].sources, vec!["a#2"]);
    }

    #[tokio::test]
    async fn records_phase_and_extractor_timings() {
        let registry = ExtractorRegistry::new()
            .register(StaticExtractor::new("slow", &[("#102030", 0.5)]).with_delay(
                Duration::from_millis(50),
            ));

        let result = ExtractionOrchestrator::default()
            .extract_all(IMAGE, "img", &registry)
            .await
            .unwrap();

        let running = result.timings.get_phase_duration(&OrchestrationPhase::Running);
        assert!(running >= Duration::from_millis(50));
        let slow = result.timings.get_extractor_duration("slow").unwrap();
        assert!(slow >= Duration::from_millis(50));
        assert!(result
            .timings
            .get_all_phase_durations()
            .contains_key(&OrchestrationPhase::Aggregating));
    }

    #[tokio::test]
    async fn local_extractors_on_a_real_image() {
        let mut image = RgbImage::new(32, 32);
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            *pixel = if x < 16 {
                Rgb([230, 30, 40])
            } else {
                Rgb([20, 60, 200])
            };
        }
        let bytes = encode_png(&image);

        let result = ExtractionOrchestrator::default()
            .extract_all(&bytes, "stripes", &ExtractorFactory::create_local())
            .await
            .unwrap();

        assert!(result.failures.is_empty());
        assert_eq!(
            result.successes.keys().collect::<Vec<_>>(),
            vec!["kmeans", "histogram"]
        );
        assert!(result.aggregated_colors.len() >= 2);
        let min = result
            .aggregated_colors
            .min_pairwise_distance()
            .unwrap_or(f32::INFINITY);
        assert!(min >= result.aggregated_colors.threshold);
        assert!(result.overall_confidence > 0.0 && result.overall_confidence <= 1.0);
    }

    #[tokio::test]
    async fn undecodable_image_fails_every_local_extractor() {
        let error = ExtractionOrchestrator::default()
            .extract_all(b"garbage", "bad", &ExtractorFactory::create_local())
            .await
            .unwrap_err();

        match error {
            OrchestrationError::AllExtractorsFailed { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert!(failures
                    .iter()
                    .all(|f| matches!(f.error.kind, AdapterErrorKind::Decode(_))));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
