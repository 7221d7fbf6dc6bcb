//! One-hop graph reads: incident edges grouped by counterpart type, and the
//! full documents behind them
use crate::edge::Edge;
use crate::entity::{Entity, EntityStore};
use crate::error::Result;
use crate::relation::RelationService;
use crate::types::{EntityId, EntityType, RelationKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The edges touching one node, read in a single pass.
#[derive(Debug, Clone)]
pub struct NodeGraph {
    node: EntityId,
    edges: Vec<Edge>,
}

impl NodeGraph {
    pub fn node(&self) -> &EntityId {
        &self.node
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn ids_by_type(&self) -> BTreeMap<EntityType, BTreeSet<EntityId>> {
        let mut grouped: BTreeMap<EntityType, BTreeSet<EntityId>> = BTreeMap::new();
        for edge in &self.edges {
            if let Some(other) = edge.counterpart(&self.node) {
                grouped
                    .entry(other.entity_type)
                    .or_default()
                    .insert(other.id.clone());
            }
        }
        grouped
    }

    /// Counterpart ids reached through `kind` edges whose far side is `counterpart`.
    pub fn ids_for(&self, kind: &RelationKind, counterpart: EntityType) -> BTreeSet<EntityId> {
        self.edges
            .iter()
            .filter(|e| e.kind == *kind)
            .filter_map(|e| e.counterpart(&self.node))
            .filter(|n| n.entity_type == counterpart)
            .map(|n| n.id.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct GraphPopulator {
    relations: RelationService,
    entities: Arc<dyn EntityStore>,
}

impl GraphPopulator {
    pub fn new(relations: RelationService, entities: Arc<dyn EntityStore>) -> Self {
        Self {
            relations,
            entities,
        }
    }

    pub fn relations(&self) -> &RelationService {
        &self.relations
    }

    pub fn entities(&self) -> &dyn EntityStore {
        self.entities.as_ref()
    }

    pub fn snapshot(&self, node: &EntityId) -> Result<NodeGraph> {
        Ok(NodeGraph {
            node: node.clone(),
            edges: self.relations.get_related(node)?,
        })
    }

    /// Full documents of every node one hop from `node`, keyed by type. Every
    /// type is present in the result; types with no relations map to an empty
    /// list. Ids whose document no longer exists are dropped.
    pub fn populate_graph_relations(&self, node: &EntityId) -> Result<BTreeMap<EntityType, Vec<Entity>>> {
        let grouped = self.snapshot(node)?.ids_by_type();
        let mut out = BTreeMap::new();

        for ty in EntityType::ALL {
            let docs = match grouped.get(&ty) {
                Some(ids) => self.entities.find_many(ty, ids)?,
                None => Vec::new(),
            };
            out.insert(ty, docs);
        }

        Ok(out)
    }
}
