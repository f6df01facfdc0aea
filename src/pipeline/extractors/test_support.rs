//! Fake extractors for orchestration and aggregation tests.

use super::{ColorExtractor, ExtractionOptions};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::pipeline::types::{ExtractedColorToken, ExtractionResult};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Returns a fixed palette, optionally after a delay.
pub struct StaticExtractor {
    name: String,
    tokens: Vec<ExtractedColorToken>,
    delay: Option<Duration>,
}

impl StaticExtractor {
    pub fn new(name: &str, palette: &[(&str, f32)]) -> Self {
        let tokens = palette
            .iter()
            .map(|(hex, confidence)| {
                ExtractedColorToken::from_hex(hex, *confidence, name).expect("valid test hex")
            })
            .collect();
        Self {
            name: name.to_string(),
            tokens,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn result(&self) -> ExtractionResult {
        ExtractionResult::with_duration(&self.name, self.tokens.clone(), Duration::ZERO)
    }
}

#[async_trait]
impl ColorExtractor for StaticExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        _image: &[u8],
        options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError> {
        let started = Instant::now();
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = options.cancellation.cancelled() => {
                    return Err(AdapterError::new(&self.name, AdapterErrorKind::Cancelled));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(ExtractionResult::finish(
            &self.name,
            self.tokens.clone(),
            started,
        ))
    }
}

/// Always fails with the given cause.
pub struct FailingExtractor {
    name: String,
    cause: String,
}

impl FailingExtractor {
    pub fn new(name: &str, cause: &str) -> Self {
        Self {
            name: name.to_string(),
            cause: cause.to_string(),
        }
    }
}

#[async_trait]
impl ColorExtractor for FailingExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        _image: &[u8],
        _options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError> {
        Err(AdapterError::new(
            &self.name,
            AdapterErrorKind::Remote(self.cause.clone()),
        ))
    }
}

/// Panics inside its task.
pub struct PanickingExtractor;

#[async_trait]
impl ColorExtractor for PanickingExtractor {
    fn name(&self) -> &str {
        "panics"
    }

    async fn extract(
        &self,
        _image: &[u8],
        _options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError> {
        panic!("extractor blew up")
    }
}
