pub mod factory;
pub mod histogram;
pub mod kmeans;
pub mod registry;
pub mod remote;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

use crate::config::ExtractionConfig;
use crate::error::AdapterError;
use crate::pipeline::types::ExtractionResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use factory::ExtractorFactory;
pub use histogram::HistogramExtractor;
pub use kmeans::KMeansExtractor;
pub use registry::ExtractorRegistry;
pub use remote::RemoteModelExtractor;
pub use service::ExtractorService;

/// Strategy pattern for color extraction.
///
/// Local implementations must be deterministic: the same bytes and options
/// always yield the same tokens in the same order. Implementations doing
/// I/O must stop promptly once `options.cancellation` fires.
#[async_trait]
pub trait ColorExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(
        &self,
        image: &[u8],
        options: &ExtractionOptions,
    ) -> Result<ExtractionResult, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub max_colors: usize,
    pub sample_step: u32,
    pub seed: u64,
    pub cancellation: CancellationToken,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for ExtractionOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_colors: config.max_colors,
            sample_step: config.sample_step,
            seed: config.seed,
            cancellation: CancellationToken::new(),
        }
    }
}

impl ExtractionOptions {
    /// Same settings with a token that is cancelled along with this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }
}

/// Request handed to an [`ExtractorService`].
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub image: Arc<[u8]>,
    pub options: ExtractionOptions,
}
