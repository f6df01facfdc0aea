use super::{Relation, RelationMetadata, RelationType, Token, TokenId, TokenType, TokenValue};
use crate::error::GraphError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of following a MULTIPLE_OF chain to its base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMultiple {
    pub base: TokenId,
    /// Product of the multipliers along the chain.
    pub factor: f64,
    pub value: TokenValue,
}

/// Design tokens and the typed relations between them.
///
/// Every mutation validates completely before touching the graph, so a
/// rejected call leaves it exactly as it was. Snapshots deserialized from
/// outside are not validated; resolution still reports cycles and dangling
/// references in them instead of looping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenGraph {
    tokens: IndexMap<TokenId, Token>,
    /// Outbound relations keyed by source.
    #[serde(default)]
    relations: IndexMap<TokenId, Vec<Relation>>,
}

impl TokenGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.values().map(Vec::len).sum()
    }

    pub fn token(&self, id: &TokenId) -> Option<&Token> {
        self.tokens.get(id)
    }

    /// Tokens in insertion order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn add_token(
        &mut self,
        id: impl Into<TokenId>,
        token_type: TokenType,
        value: TokenValue,
    ) -> Result<(), GraphError> {
        let id = id.into();
        if self.tokens.contains_key(&id) {
            return Err(GraphError::DuplicateToken(id));
        }
        self.tokens
            .insert(id.clone(), Token::new(id, token_type, value));
        Ok(())
    }

    pub fn insert_token(&mut self, token: Token) -> Result<(), GraphError> {
        self.add_token(token.id, token.token_type, token.value)
    }

    pub fn add_relation(
        &mut self,
        source: impl Into<TokenId>,
        relation_type: RelationType,
        target: impl Into<TokenId>,
        metadata: RelationMetadata,
    ) -> Result<(), GraphError> {
        let relation = Relation {
            source: source.into(),
            relation_type,
            target: target.into(),
            metadata,
        };
        self.check_relation(&relation)?;

        debug!(
            "Adding {} relation '{}' -> '{}'",
            relation.relation_type, relation.source, relation.target
        );
        self.relations
            .entry(relation.source.clone())
            .or_default()
            .push(relation);
        Ok(())
    }

    fn check_relation(&self, relation: &Relation) -> Result<(), GraphError> {
        if !self.tokens.contains_key(&relation.source) {
            return Err(GraphError::UnknownToken(relation.source.clone()));
        }
        if !self.tokens.contains_key(&relation.target) {
            return Err(GraphError::DanglingReference {
                source_id: relation.source.clone(),
                target: relation.target.clone(),
            });
        }

        if relation.relation_type == RelationType::MultipleOf {
            match relation.metadata.multiplier {
                Some(m) if m.is_finite() => {}
                other => {
                    return Err(GraphError::InvalidMetadata(format!(
                        "MULTIPLE_OF '{}' -> '{}' needs a finite multiplier, got {:?}",
                        relation.source, relation.target, other
                    )))
                }
            }
        }

        let outbound = self.outbound(&relation.source);
        if outbound.iter().any(|existing| existing.same_edge(relation)) {
            return Err(GraphError::DuplicateRelation {
                source_id: relation.source.clone(),
                relation: relation.relation_type.to_string(),
                target: relation.target.clone(),
            });
        }
        if relation.relation_type.is_functional() {
            if let Some(existing) = outbound.iter().find(|r| r.relation_type.is_functional()) {
                return Err(GraphError::ConflictingRelation {
                    source_id: relation.source.clone(),
                    relation: existing.relation_type.to_string(),
                });
            }
        }

        if let Some(path) =
            self.path_between(&relation.target, &relation.source, relation.relation_type)
        {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(relation.source.clone());
            cycle.extend(path);
            return Err(GraphError::CycleDetected { path: cycle });
        }

        Ok(())
    }

    /// Path `from -> ... -> to` over edges that can close a cycle with an
    /// edge of `relation_type`, if any.
    fn path_between(
        &self,
        from: &TokenId,
        to: &TokenId,
        relation_type: RelationType,
    ) -> Option<Vec<TokenId>> {
        let mut parents: IndexMap<&TokenId, Option<&TokenId>> = IndexMap::new();
        parents.insert(from, None);
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(Some(parent)) = parents.get(cursor) {
                    path.push((*parent).clone());
                    cursor = *parent;
                }
                path.reverse();
                return Some(path);
            }
            for next in self
                .outbound(current)
                .iter()
                .filter(|r| relation_type.shares_cycles_with(r.relation_type))
                .map(|r| &r.target)
            {
                if !parents.contains_key(next) {
                    parents.insert(next, Some(current));
                    stack.push(next);
                }
            }
        }
        None
    }

    /// Removes one relation, returning it if it existed.
    pub fn remove_relation(
        &mut self,
        source: &TokenId,
        relation_type: RelationType,
        target: &TokenId,
    ) -> Option<Relation> {
        let relations = self.relations.get_mut(source)?;
        let position = relations
            .iter()
            .position(|r| r.relation_type == relation_type && &r.target == target)?;
        let removed = relations.remove(position);
        if relations.is_empty() {
            self.relations.shift_remove(source);
        }
        Some(removed)
    }

    /// Outbound relations of `id`, in insertion order.
    pub fn relations_of(&self, id: &TokenId) -> Result<&[Relation], GraphError> {
        if !self.tokens.contains_key(id) {
            return Err(GraphError::UnknownToken(id.clone()));
        }
        Ok(self.outbound(id))
    }

    /// Relations pointing at `id`.
    pub fn inbound_relations(&self, id: &TokenId) -> Vec<&Relation> {
        self.relations
            .values()
            .flatten()
            .filter(|r| &r.target == id)
            .collect()
    }

    fn outbound(&self, id: &TokenId) -> &[Relation] {
        self.relations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn first_outbound(&self, id: &TokenId, relation_type: RelationType) -> Option<&Relation> {
        self.outbound(id)
            .iter()
            .find(|r| r.relation_type == relation_type)
    }

    fn lookup(&self, id: &TokenId, reached_from: Option<&TokenId>) -> Result<&Token, GraphError> {
        self.tokens.get(id).ok_or_else(|| match reached_from {
            Some(source) => GraphError::DanglingReference {
                source_id: source.clone(),
                target: id.clone(),
            },
            None => GraphError::UnknownToken(id.clone()),
        })
    }

    /// Follows ALIAS_OF edges to the token that carries a value.
    pub fn resolve_alias(&self, id: &TokenId) -> Result<&Token, GraphError> {
        let mut visited: IndexSet<&TokenId> = IndexSet::new();
        let mut current = id;
        let mut reached_from = None;

        loop {
            if !visited.insert(current) {
                return Err(cycle_error(&visited, current));
            }
            let token = self.lookup(current, reached_from)?;
            match self.first_outbound(current, RelationType::AliasOf) {
                Some(alias) => {
                    reached_from = Some(current);
                    current = &alias.target;
                }
                None => return Ok(token),
            }
        }
    }

    /// Follows MULTIPLE_OF edges, passing through aliases, to the base token
    /// and scales its value by the product of multipliers on the way.
    pub fn resolve_multiple(&self, id: &TokenId) -> Result<ResolvedMultiple, GraphError> {
        let mut visited: IndexSet<&TokenId> = IndexSet::new();
        let mut current = id;
        let mut reached_from = None;
        let mut factor = 1.0f64;
        let mut hops = 0usize;

        loop {
            if !visited.insert(current) {
                return Err(cycle_error(&visited, current));
            }
            let token = self.lookup(current, reached_from)?;

            let next = match self.first_outbound(current, RelationType::MultipleOf) {
                Some(multiple) => {
                    let multiplier = multiple.metadata.multiplier.ok_or_else(|| {
                        GraphError::InvalidMetadata(format!(
                            "MULTIPLE_OF '{}' -> '{}' has no multiplier",
                            multiple.source, multiple.target
                        ))
                    })?;
                    factor *= multiplier;
                    hops += 1;
                    Some(&multiple.target)
                }
                None => self
                    .first_outbound(current, RelationType::AliasOf)
                    .map(|alias| &alias.target),
            };

            match next {
                Some(target) => {
                    reached_from = Some(current);
                    current = target;
                }
                None => {
                    let value = if hops == 0 {
                        token.value.clone()
                    } else {
                        token
                            .value
                            .scaled(factor)
                            .ok_or_else(|| GraphError::NotScalable(token.id.clone()))?
                    };
                    return Ok(ResolvedMultiple {
                        base: token.id.clone(),
                        factor,
                        value,
                    });
                }
            }
        }
    }
}

fn cycle_error(visited: &IndexSet<&TokenId>, repeated: &TokenId) -> GraphError {
    let start = visited.get_index_of(repeated).unwrap_or(0);
    let mut path: Vec<TokenId> = visited
        .iter()
        .skip(start)
        .map(|id| (*id).clone())
        .collect();
    path.push(repeated.clone());
    GraphError::CycleDetected { path }
}
