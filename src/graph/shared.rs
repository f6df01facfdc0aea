use super::{
    RelationMetadata, RelationType, ResolvedMultiple, Token, TokenGraph, TokenId, TokenType,
    TokenValue,
};
use crate::error::GraphError;
use std::sync::{Arc, RwLock};

/// Token graph shared between one curating writer and any number of readers.
///
/// Writers validate before mutating while holding the write lock, so readers
/// never observe a half-applied change. Batches go through [`apply`], which
/// edits a copy and swaps it in only when every step succeeded.
///
/// [`apply`]: SharedTokenGraph::apply
#[derive(Clone, Default)]
pub struct SharedTokenGraph {
    inner: Arc<RwLock<TokenGraph>>,
}

impl SharedTokenGraph {
    pub fn new(graph: TokenGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&TokenGraph) -> R) -> Result<R, GraphError> {
        let graph = self.inner.read().map_err(|_| GraphError::LockPoisoned)?;
        Ok(f(&graph))
    }

    /// Runs `f` against a copy and publishes it only on success.
    pub fn apply<R>(
        &self,
        f: impl FnOnce(&mut TokenGraph) -> Result<R, GraphError>,
    ) -> Result<R, GraphError> {
        let mut graph = self.inner.write().map_err(|_| GraphError::LockPoisoned)?;
        let mut draft = graph.clone();
        let output = f(&mut draft)?;
        *graph = draft;
        Ok(output)
    }

    pub fn add_token(
        &self,
        id: impl Into<TokenId>,
        token_type: TokenType,
        value: TokenValue,
    ) -> Result<(), GraphError> {
        let mut graph = self.inner.write().map_err(|_| GraphError::LockPoisoned)?;
        graph.add_token(id, token_type, value)
    }

    pub fn add_relation(
        &self,
        source: impl Into<TokenId>,
        relation_type: RelationType,
        target: impl Into<TokenId>,
        metadata: RelationMetadata,
    ) -> Result<(), GraphError> {
        let mut graph = self.inner.write().map_err(|_| GraphError::LockPoisoned)?;
        graph.add_relation(source, relation_type, target, metadata)
    }

    pub fn resolve_alias(&self, id: &TokenId) -> Result<Token, GraphError> {
        self.read(|graph| graph.resolve_alias(id).cloned())?
    }

    pub fn resolve_multiple(&self, id: &TokenId) -> Result<ResolvedMultiple, GraphError> {
        self.read(|graph| graph.resolve_multiple(id))?
    }

    pub fn snapshot(&self) -> Result<TokenGraph, GraphError> {
        self.read(TokenGraph::clone)
    }
}
