use crate::graph::TokenId;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

// Main application error type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Orchestration Error: {0}")]
    Orchestration(#[from] OrchestrationError),
    #[error("Graph Error: {0}")]
    Graph(#[from] GraphError),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Usage: {0}")]
    Usage(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a single extraction strategy. Always attributed to the adapter
/// that produced it.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("extractor '{adapter}' failed: {kind}")]
pub struct AdapterError {
    pub adapter: String,
    pub kind: AdapterErrorKind,
}

impl AdapterError {
    pub fn new(adapter: impl Into<String>, kind: AdapterErrorKind) -> Self {
        Self {
            adapter: adapter.into(),
            kind,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, AdapterErrorKind::Timeout(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum AdapterErrorKind {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("remote inference failed: {0}")]
    Remote(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Other(String),
}

/// A named adapter paired with the reason it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractorFailure {
    pub adapter: String,
    pub error: AdapterError,
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("all {} extractors failed for image '{image_id}'", failures.len())]
    AllExtractorsFailed {
        image_id: String,
        failures: Vec<ExtractorFailure>,
    },
    #[error("safe mode accepts at most {limit} extractors, got {requested}")]
    TooManyExtractors { limit: usize, requested: usize },
    #[error("duplicate extractor name '{0}' rejected in safe mode")]
    DuplicateExtractor(String),
}

/// Non-fatal aggregation problem. Logged and reported, never raised.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum AggregationWarning {
    #[error("dropped token {index} from '{adapter}': {reason}")]
    MalformedToken {
        adapter: String,
        index: usize,
        reason: String,
    },
    #[error("invalid threshold {requested}, using {used}")]
    InvalidThreshold { requested: f32, used: f32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("token '{0}' already exists")]
    DuplicateToken(TokenId),
    #[error("token '{0}' does not exist")]
    UnknownToken(TokenId),
    #[error("dangling reference: '{source_id}' -> '{target}'")]
    DanglingReference { source_id: TokenId, target: TokenId },
    #[error("cycle detected: {}", format_path(path))]
    CycleDetected { path: Vec<TokenId> },
    #[error("relation {relation} '{source_id}' -> '{target}' already exists")]
    DuplicateRelation {
        source_id: TokenId,
        relation: String,
        target: TokenId,
    },
    #[error("token '{source_id}' already has an outbound {relation} relation")]
    ConflictingRelation { source_id: TokenId, relation: String },
    #[error("invalid relation metadata: {0}")]
    InvalidMetadata(String),
    #[error("token '{0}' has no numeric value to scale")]
    NotScalable(TokenId),
    #[error("token graph lock poisoned")]
    LockPoisoned,
}

fn format_path(path: &[TokenId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
