use super::{ExtractorRegistry, HistogramExtractor, KMeansExtractor, RemoteModelExtractor};
use crate::config::{Configuration, RemoteConfig};
use crate::error::ConfigError;
use std::time::Duration;

const DEFAULT_REMOTE_NAME: &str = "remote";

/// Factory for building extractor registries from configuration
pub struct ExtractorFactory;

impl ExtractorFactory {
    /// Local strategies only: clustering first, then pixel statistics
    pub fn create_local() -> ExtractorRegistry {
        ExtractorRegistry::new()
            .register(KMeansExtractor::new())
            .register(HistogramExtractor::new())
    }

    /// Local strategies plus the remote model when one is configured. The
    /// remote extractor goes first so its colors win ordering ties.
    pub fn from_config(configuration: &Configuration) -> Result<ExtractorRegistry, ConfigError> {
        configuration.validate()?;

        let mut registry = ExtractorRegistry::new();
        if let Some(remote) = &configuration.remote {
            registry = registry.register(Self::create_remote(remote)?);
        }

        Ok(registry
            .register(KMeansExtractor::new())
            .register(HistogramExtractor::new()))
    }

    pub fn create_remote(remote: &RemoteConfig) -> Result<RemoteModelExtractor, ConfigError> {
        let name = remote.name.as_deref().unwrap_or(DEFAULT_REMOTE_NAME);
        let extractor = RemoteModelExtractor::new(
            name,
            remote.endpoint.clone(),
            Duration::from_millis(remote.request_timeout_ms),
        )
        .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {}", e)))?;

        Ok(match &remote.model {
            Some(model) => extractor.with_model(model.clone()),
            None => extractor,
        })
    }
}
