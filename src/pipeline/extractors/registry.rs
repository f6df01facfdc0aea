use super::ColorExtractor;
use std::sync::Arc;

/// Ordered set of extractors handed to the orchestrator for one call.
/// Registration order is the adapter order used for tie-breaking during
/// aggregation.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn ColorExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, extractor: impl ColorExtractor + 'static) -> Self {
        self.register_shared(Arc::new(extractor))
    }

    pub fn register_shared(mut self, extractor: Arc<dyn ColorExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ColorExtractor>> {
        self.extractors.iter()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extractors::{HistogramExtractor, KMeansExtractor};

    #[test]
    fn preserves_registration_order() {
        let registry = ExtractorRegistry::new()
            .register(KMeansExtractor::new())
            .register(HistogramExtractor::new());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["kmeans", "histogram"]);
    }
}
