pub mod common;
pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;

pub use config::Configuration;
pub use error::{AdapterError, AppError, GraphError, OrchestrationError};

pub use graph::{SharedTokenGraph, TokenGraph};
pub use pipeline::{
    aggregate, extract_all, ExtractionOrchestrator, ExtractorFactory, ExtractorRegistry,
};
