mod aggregated_token;
mod extracted_token;
mod orchestration_result;

pub use aggregated_token::{AggregatedToken, Aggregation, TokenProvenance};
pub use extracted_token::{ConfidenceRange, ExtractedColorToken, ExtractionResult};
pub use orchestration_result::OrchestrationResult;
