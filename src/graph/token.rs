use crate::pipeline::types::AggregatedToken;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a design token, e.g. `color.brand.primary`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TokenId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Color,
    /// Spacing, sizing and radii.
    Dimension,
    Typography,
    Shadow,
    Number,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TokenValue {
    /// `#RRGGBB`
    Color(String),
    Dimension { value: f64, unit: String },
    Number(f64),
    /// Anything else, kept verbatim.
    Raw(String),
}

impl TokenValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TokenValue::Dimension { value, .. } => Some(*value),
            TokenValue::Number(n) => Some(*n),
            TokenValue::Color(_) | TokenValue::Raw(_) => None,
        }
    }

    /// Multiplies a numeric payload, keeping its unit. `None` for
    /// non-numeric values.
    pub fn scaled(&self, factor: f64) -> Option<TokenValue> {
        match self {
            TokenValue::Dimension { value, unit } => Some(TokenValue::Dimension {
                value: value * factor,
                unit: unit.clone(),
            }),
            TokenValue::Number(n) => Some(TokenValue::Number(n * factor)),
            TokenValue::Color(_) | TokenValue::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub token_type: TokenType,
    pub value: TokenValue,
}

impl Token {
    pub fn new(id: impl Into<TokenId>, token_type: TokenType, value: TokenValue) -> Self {
        Self {
            id: id.into(),
            token_type,
            value,
        }
    }

    /// Color token for a curated aggregation result.
    pub fn from_aggregated(id: impl Into<TokenId>, aggregated: &AggregatedToken) -> Self {
        Self::new(
            id,
            TokenType::Color,
            TokenValue::Color(aggregated.hex.clone()),
        )
    }
}
