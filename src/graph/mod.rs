//! Curated design tokens and the ALIAS_OF, MULTIPLE_OF and COMPOSES relations
//! between them.

pub mod relation;
pub mod shared;
pub mod token;
pub mod token_graph;

pub use relation::{Relation, RelationMetadata, RelationType};
pub use shared::SharedTokenGraph;
pub use token::{Token, TokenId, TokenType, TokenValue};
pub use token_graph::{ResolvedMultiple, TokenGraph};
