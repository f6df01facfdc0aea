use crate::common::{DistanceMetric, DEFAULT_JND_THRESHOLD};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "COLOR_TOKENS";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Configuration {
    pub orchestrator: OrchestratorConfig,
    pub aggregation: AggregationConfig,
    pub extraction: ExtractionConfig,
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub per_adapter_timeout_ms: u64,
    /// Caps the extractor count and rejects duplicate names.
    pub safe_mode: bool,
    pub max_extractors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub threshold: f32,
    pub metric: DistanceMetric,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_colors: usize,
    pub sample_step: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub name: Option<String>,
    pub endpoint: String,
    pub model: Option<String>,
    #[serde(default = "default_remote_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_remote_timeout_ms() -> u64 {
    10_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            per_adapter_timeout_ms: 5_000,
            safe_mode: true,
            max_extractors: 8,
        }
    }
}

impl OrchestratorConfig {
    pub fn per_adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.per_adapter_timeout_ms)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.per_adapter_timeout_ms = timeout_ms;
        self
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    pub fn with_max_extractors(mut self, max_extractors: usize) -> Self {
        self.max_extractors = max_extractors;
        self
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_JND_THRESHOLD,
            metric: DistanceMetric::Cie76,
        }
    }
}

impl AggregationConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_colors: 8,
            sample_step: 4,
            seed: 42,
        }
    }
}

impl Configuration {
    /// Defaults, overlaid by an optional file, overlaid by
    /// `COLOR_TOKENS__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let configuration: Configuration = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.per_adapter_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "per_adapter_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.orchestrator.max_extractors == 0 {
            return Err(ConfigError::Invalid(
                "max_extractors must be greater than 0".to_string(),
            ));
        }

        if !self.aggregation.threshold.is_finite() || self.aggregation.threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "aggregation threshold must be a positive number".to_string(),
            ));
        }

        if self.extraction.max_colors == 0 {
            return Err(ConfigError::Invalid(
                "max_colors must be greater than 0".to_string(),
            ));
        }

        if self.extraction.sample_step == 0 {
            return Err(ConfigError::Invalid(
                "sample_step must be greater than 0".to_string(),
            ));
        }

        if let Some(remote) = &self.remote {
            if remote.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "remote endpoint must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }
}
