//! Reconcile an owner's desired relation field values against the graph
//!
//! Each field is handled as read, diff, write against a fresh snapshot. Fields
//! are applied one after another with no transaction spanning them: if a write
//! fails, fields already processed keep their new edges and the error is
//! returned. Two concurrent syncs of the same owner are not serialised either;
//! the edge uniqueness key prevents duplicate edges, and the last diff to run
//! decides removals.
use crate::entity::Entity;
use crate::error::Result;
use crate::populate::GraphPopulator;
use crate::registry::RelationRegistry;
use crate::types::{EntityId, EntityType, NodeRef};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Relation field name -> related ids, as exposed on an owner document.
pub type RelationFields = BTreeMap<String, Vec<EntityId>>;

#[derive(Clone)]
pub struct RelationSync {
    populator: GraphPopulator,
    registry: RelationRegistry,
}

impl RelationSync {
    pub fn new(populator: GraphPopulator, registry: RelationRegistry) -> Self {
        Self {
            populator,
            registry,
        }
    }

    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    /// Bring every field named in `desired` to exactly the listed ids, then
    /// return the current value of all of the owner's relation fields.
    ///
    /// Fields that are not relation fields of `owner_type` are skipped. Edges
    /// for ids present both before and after are left untouched.
    pub fn sync_relations(
        &self,
        owner_type: EntityType,
        owner_id: &EntityId,
        desired: &BTreeMap<String, Vec<EntityId>>,
    ) -> Result<RelationFields> {
        let owner = NodeRef::new(owner_id.clone(), owner_type);
        let relations = self.populator.relations();

        for (field, ids) in desired {
            let Some(mapping) = self.registry.field(owner_type, field) else {
                debug!(%owner_type, field = %field, "skipping non-relation field");
                continue;
            };

            let current = self
                .populator
                .snapshot(owner_id)?
                .ids_for(&mapping.kind, mapping.counterpart);
            let wanted: BTreeSet<EntityId> = ids.iter().cloned().collect();

            let to_add: Vec<&EntityId> = wanted.difference(&current).collect();
            let to_remove: Vec<&EntityId> = current.difference(&wanted).collect();
            debug!(
                %owner_id,
                field = %field,
                kind = %mapping.kind,
                add = to_add.len(),
                remove = to_remove.len(),
                "relation diff"
            );

            for id in to_add {
                let other = NodeRef::new(id.clone(), mapping.counterpart);
                relations.add_relation(&mapping.kind, &owner, &other)?;
            }
            for id in to_remove {
                relations.remove_relation(&mapping.kind, owner_id, id)?;
            }
        }

        self.relation_fields(owner_type, owner_id)
    }

    /// Ids currently related to the owner, for each of its registry fields.
    pub fn relation_fields(&self, owner_type: EntityType, owner_id: &EntityId) -> Result<RelationFields> {
        let graph = self.populator.snapshot(owner_id)?;

        Ok(self
            .registry
            .fields_for(owner_type)
            .into_iter()
            .map(|m| {
                let ids = graph.ids_for(&m.kind, m.counterpart).into_iter().collect();
                (m.field.to_owned(), ids)
            })
            .collect())
    }

    /// Like [`relation_fields`](Self::relation_fields) but with the full
    /// documents loaded. Ids whose document is gone are dropped.
    pub fn expanded_relation_fields(
        &self,
        owner_type: EntityType,
        owner_id: &EntityId,
    ) -> Result<BTreeMap<String, Vec<Entity>>> {
        let graph = self.populator.snapshot(owner_id)?;
        let mut out = BTreeMap::new();

        for m in self.registry.fields_for(owner_type) {
            let ids = graph.ids_for(&m.kind, m.counterpart);
            let docs = self.populator.entities().find_many(m.counterpart, &ids)?;
            out.insert(m.field.to_owned(), docs);
        }

        Ok(out)
    }
}
