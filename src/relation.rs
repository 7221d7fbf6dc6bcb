//! Add, remove and query relations over the edge store
//!
//! Edges are stored once, in the orientation they were added. Everything here
//! treats them as undirected: lookups and removals match a node on either side.
use crate::edge::{Edge, EdgeStore};
use crate::entity::EntityStore;
use crate::error::{Error, Result};
use crate::registry::RelationRegistry;
use crate::types::{EntityId, EntityType, NodeRef, RelationKind};
use std::collections::BTreeMap;
use tracing::debug;

/// Problems found by [`RelationService::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    UnregisteredKind { kind: RelationKind },
    TypeMismatch { kind: RelationKind, from: EntityType, to: EntityType },
    MissingEndpoint { kind: RelationKind, node: NodeRef },
}

#[derive(Clone)]
pub struct RelationService {
    store: EdgeStore,
}

impl RelationService {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            store: EdgeStore::open(db)?,
        })
    }

    pub fn store(&self) -> &EdgeStore {
        &self.store
    }

    /// Store one `from -> to` edge. Adding a relation that already exists, in
    /// either orientation, succeeds without writing. Returns whether an edge
    /// was created.
    pub fn add_relation(&self, kind: &RelationKind, from: &NodeRef, to: &NodeRef) -> Result<bool> {
        let edge = Edge::new(kind.clone(), from.clone(), to.clone());
        let created = self.store.insert(&edge)?;
        debug!(%kind, from = %from.id, to = %to.id, created, "add relation");
        Ok(created)
    }

    /// [`add_relation`](Self::add_relation) after checking both endpoints exist.
    pub fn add_verified(
        &self,
        entities: &dyn EntityStore,
        kind: &RelationKind,
        from: &NodeRef,
        to: &NodeRef,
    ) -> Result<bool> {
        for node in [from, to] {
            if entities.find_by_id(node.entity_type, &node.id)?.is_none() {
                return Err(Error::not_found(node.entity_type.as_str(), node.id.as_str()));
            }
        }
        self.add_relation(kind, from, to)
    }

    /// Remove the `kind` relation between `a` and `b`. Removing a relation that
    /// does not exist is a successful no-op. Returns the number of edges deleted.
    pub fn remove_relation(&self, kind: &RelationKind, a: &EntityId, b: &EntityId) -> Result<usize> {
        let removed = self.store.remove_between(kind, a, b)?;
        debug!(%kind, %a, %b, removed, "remove relation");
        Ok(removed)
    }

    /// Every edge touching `node`, of any kind.
    pub fn get_related(&self, node: &EntityId) -> Result<Vec<Edge>> {
        self.store.incident(node)
    }

    pub fn get_related_by_kind(&self, kind: &RelationKind, node: &EntityId) -> Result<Vec<Edge>> {
        let mut edges = self.store.incident(node)?;
        edges.retain(|e| e.kind == *kind);
        Ok(edges)
    }

    /// One-hop expansion of `node`: counterpart ids grouped by their type.
    pub fn get_graph_for_node(&self, node: &EntityId) -> Result<BTreeMap<EntityType, Vec<EntityId>>> {
        let mut graph: BTreeMap<EntityType, Vec<EntityId>> = BTreeMap::new();
        for edge in self.store.incident(node)? {
            if let Some(other) = edge.counterpart(node) {
                graph
                    .entry(other.entity_type)
                    .or_default()
                    .push(other.id.clone());
            }
        }
        Ok(graph)
    }

    /// Walk every edge and report kinds missing from `registry`, endpoint types
    /// that do not match the registered pair, and endpoints with no document.
    pub fn audit(&self, entities: &dyn EntityStore, registry: &RelationRegistry) -> Result<Vec<GraphIssue>> {
        let mut issues = Vec::new();

        for edge in self.store.all()? {
            match registry.pair_for_kind(&edge.kind) {
                None => issues.push(GraphIssue::UnregisteredKind {
                    kind: edge.kind.clone(),
                }),
                Some(pair) => {
                    let types = (edge.from.entity_type, edge.to.entity_type);
                    let declared = (pair.left.owner, pair.right.owner);
                    if types != declared && types != (declared.1, declared.0) {
                        issues.push(GraphIssue::TypeMismatch {
                            kind: edge.kind.clone(),
                            from: types.0,
                            to: types.1,
                        });
                    }
                }
            }

            for node in [&edge.from, &edge.to] {
                if entities.find_by_id(node.entity_type, &node.id)?.is_none() {
                    issues.push(GraphIssue::MissingEndpoint {
                        kind: edge.kind.clone(),
                        node: node.clone(),
                    });
                }
            }
        }

        Ok(issues)
    }
}
