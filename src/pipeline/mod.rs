pub mod aggregation;
pub mod extractors;
pub mod orchestration;
pub mod types;

pub use aggregation::{aggregate, ColorAggregator};
pub use extractors::{ColorExtractor, ExtractionOptions, ExtractorFactory, ExtractorRegistry};
pub use orchestration::{extract_all, ExtractionOrchestrator};
pub use types::{
    AggregatedToken, Aggregation, ExtractedColorToken, ExtractionResult, OrchestrationResult,
};
