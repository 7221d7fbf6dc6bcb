//! Content documents and the store collaborator that loads them by id
use crate::error::Result;
use crate::types::{EntityId, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
    Rejected,
}

/// A blog, tour, destination, month or category document.
///
/// Only the fields the graph needs are typed. Everything else a content type
/// carries lives in `extras`, which is flattened into the top level of the
/// JSON document on serialize and collected back on deserialize.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(entity_type: EntityType, title: &str) -> Self {
        Self {
            id: EntityId::generate(),
            entity_type,
            status: ContentStatus::Draft,
            title: title.to_owned(),
            slug: slugify(title),
            extras: BTreeMap::new(),
        }
    }
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }
    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }
    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extras.insert(key.to_owned(), value);
        self
    }
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Per-type document lookup used to materialise relation fields.
pub trait EntityStore: Send + Sync {
    fn find_by_id(&self, entity_type: EntityType, id: &EntityId) -> Result<Option<Entity>>;

    /// Bulk "find by id in set". Ids without a document are skipped.
    fn find_many(&self, entity_type: EntityType, ids: &BTreeSet<EntityId>) -> Result<Vec<Entity>>;
}

/// Entity documents kept as JSON in one sled tree per type.
#[derive(Clone)]
pub struct SledEntityStore {
    trees: BTreeMap<EntityType, sled::Tree>,
}

pub fn entity_tree_name(entity_type: EntityType) -> String {
    format!("entity_{}", entity_type.as_str().to_lowercase())
}

impl SledEntityStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        let mut trees = BTreeMap::new();
        for ty in EntityType::ALL {
            trees.insert(ty, db.open_tree(entity_tree_name(ty))?);
        }
        Ok(Self { trees })
    }

    fn tree(&self, entity_type: EntityType) -> &sled::Tree {
        // open() creates a tree for every variant
        &self.trees[&entity_type]
    }

    pub fn insert(&self, entity: &Entity) -> Result<()> {
        let doc = serde_json::to_vec(entity)?;
        self.tree(entity.entity_type)
            .insert(entity.id.as_str().as_bytes(), doc)?;
        Ok(())
    }

    pub fn remove(&self, entity_type: EntityType, id: &EntityId) -> Result<bool> {
        Ok(self
            .tree(entity_type)
            .remove(id.as_str().as_bytes())?
            .is_some())
    }
}

impl EntityStore for SledEntityStore {
    fn find_by_id(&self, entity_type: EntityType, id: &EntityId) -> Result<Option<Entity>> {
        match self.tree(entity_type).get(id.as_str().as_bytes())? {
            Some(doc) => Ok(Some(serde_json::from_slice(&doc)?)),
            None => Ok(None),
        }
    }

    fn find_many(&self, entity_type: EntityType, ids: &BTreeSet<EntityId>) -> Result<Vec<Entity>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find_by_id(entity_type, id)? {
                out.push(entity);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extras_are_flattened_into_the_document() {
        let entity = Entity::new(EntityType::Tour, "Spiti Valley Winter Trek")
            .with_id(EntityId::new("t1").unwrap())
            .with_extra("pricePerPerson", json!(18500));

        let doc = entity.to_json().unwrap();

        assert_eq!(doc["type"], "Tour");
        assert_eq!(doc["slug"], "spiti-valley-winter-trek");
        assert_eq!(doc["pricePerPerson"], 18500);
        assert!(doc.get("extras").is_none());

        let back: Entity = serde_json::from_value(doc).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn find_many_skips_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("entities.db")).unwrap();
        let store = SledEntityStore::open(&db).unwrap();

        let month = Entity::new(EntityType::Month, "October");
        store.insert(&month).unwrap();

        let ids = BTreeSet::from([month.id.clone(), EntityId::new("gone").unwrap()]);
        let found = store.find_many(EntityType::Month, &ids).unwrap();

        assert_eq!(found, vec![month]);
        assert!(store.find_many(EntityType::Blog, &ids).unwrap().is_empty());
    }
}
