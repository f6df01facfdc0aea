use super::TokenId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// Same value as the target.
    AliasOf,
    /// Target's value times `metadata.multiplier`.
    MultipleOf,
    /// Target is one part of this composite token.
    Composes,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::AliasOf => "ALIAS_OF",
            RelationType::MultipleOf => "MULTIPLE_OF",
            RelationType::Composes => "COMPOSES",
        }
    }

    /// ALIAS_OF and MULTIPLE_OF define the source's value. A token may have
    /// at most one such outbound edge, of either type.
    pub fn is_functional(&self) -> bool {
        matches!(self, RelationType::AliasOf | RelationType::MultipleOf)
    }

    /// Whether a cycle through `other` edges also traps resolution of this
    /// type. Value resolution walks ALIAS_OF and MULTIPLE_OF together.
    pub fn shares_cycles_with(&self, other: RelationType) -> bool {
        *self == other || (self.is_functional() && other.is_functional())
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    /// Part name within a composite, e.g. `offset-x` or `color`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl RelationMetadata {
    pub fn multiplier(multiplier: f64) -> Self {
        Self {
            multiplier: Some(multiplier),
            role: None,
        }
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self {
            multiplier: None,
            role: Some(role.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: TokenId,
    pub relation_type: RelationType,
    pub target: TokenId,
    #[serde(default)]
    pub metadata: RelationMetadata,
}

impl Relation {
    /// Same endpoints, type and role.
    pub fn same_edge(&self, other: &Relation) -> bool {
        self.source == other.source
            && self.relation_type == other.relation_type
            && self.target == other.target
            && self.metadata.role == other.metadata.role
    }
}
