use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use super::{ColorExtractor, ExtractionRequest};
use crate::error::AdapterError;
use crate::pipeline::types::ExtractionResult;

/// Exposes a [`ColorExtractor`] as a tower service so the orchestrator can
/// layer timeouts on it.
#[derive(Clone)]
pub struct ExtractorService {
    inner: Arc<dyn ColorExtractor>,
}

impl ExtractorService {
    pub fn new(inner: Arc<dyn ColorExtractor>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

impl Service<ExtractionRequest> for ExtractorService {
    type Response = ExtractionResult;
    type Error = AdapterError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ExtractionRequest) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move { inner.extract(&req.image, &req.options).await })
    }
}
