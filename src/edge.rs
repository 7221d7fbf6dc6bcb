//! Persistent edge collection
//!
//! Every relation is one edge document in the `relations` tree, keyed by the
//! sha256 digest of its CBOR-encoded `(kind, from.id, to.id)` triple. A second
//! tree, `relations_by_node`, holds `node id \0 edge key` entries so that all
//! edges touching a node can be found with one prefix scan regardless of which
//! side the node sits on.
use crate::error::Result;
use crate::types::{EntityId, NodeRef, RelationKind, TimeStamp};
use crate::utils::{compound_key, from_cbor, prefix_key, to_cbor};
use chrono::Utc;
use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;

pub const EDGE_TREE: &str = "relations";
pub const NODE_INDEX_TREE: &str = "relations_by_node";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    #[n(0)]
    pub kind: RelationKind,
    #[n(1)]
    pub from: NodeRef,
    #[n(2)]
    pub to: NodeRef,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
    #[n(4)]
    pub updated_at: TimeStamp<Utc>,
}

impl Edge {
    pub fn new(kind: RelationKind, from: NodeRef, to: NodeRef) -> Self {
        let now = TimeStamp::new();
        Self {
            kind,
            from,
            to,
            created_at: now.clone(),
            updated_at: now,
        }
    }
    pub fn touches(&self, id: &EntityId) -> bool {
        self.from.id == *id || self.to.id == *id
    }
    /// The endpoint that is not `id`. A self-edge yields its `to` side.
    pub fn counterpart(&self, id: &EntityId) -> Option<&NodeRef> {
        if self.from.id == *id {
            Some(&self.to)
        } else if self.to.id == *id {
            Some(&self.from)
        } else {
            None
        }
    }
    pub fn key(&self) -> Result<String> {
        edge_key(&self.kind, &self.from.id, &self.to.id)
    }
}

pub fn edge_key(kind: &RelationKind, from: &EntityId, to: &EntityId) -> Result<String> {
    let cbor = minicbor::to_vec((kind.as_str(), from.as_str(), to.as_str()))?;
    Ok(sha256::digest(&cbor))
}

fn index_key(node: &EntityId, key: &str) -> Vec<u8> {
    compound_key(&[node.as_str().as_bytes(), key.as_bytes()])
}

#[derive(Clone)]
pub struct EdgeStore {
    edges: sled::Tree,
    by_node: sled::Tree,
}

impl EdgeStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            edges: db.open_tree(EDGE_TREE)?,
            by_node: db.open_tree(NODE_INDEX_TREE)?,
        })
    }

    /// Insert `edge` unless an edge with the same kind already joins the same
    /// two ids, in either orientation. Returns whether a row was written.
    pub fn insert(&self, edge: &Edge) -> Result<bool> {
        let forward = edge.key()?;
        let reverse = edge_key(&edge.kind, &edge.to.id, &edge.from.id)?;
        let bytes = to_cbor(edge)?;
        let from_entry = index_key(&edge.from.id, &forward);
        let to_entry = index_key(&edge.to.id, &forward);

        let inserted = (&self.edges, &self.by_node).transaction(
            |(edges, by_node)| -> ConflictableTransactionResult<bool> {
                if edges.get(forward.as_bytes())?.is_some()
                    || edges.get(reverse.as_bytes())?.is_some()
                {
                    return Ok(false);
                }
                edges.insert(forward.as_bytes(), bytes.as_slice())?;
                by_node.insert(from_entry.as_slice(), &[] as &[u8])?;
                by_node.insert(to_entry.as_slice(), &[] as &[u8])?;
                Ok(true)
            },
        )?;

        Ok(inserted)
    }

    /// Delete every `kind` edge joining `a` and `b`, whichever side each is on.
    pub fn remove_between(&self, kind: &RelationKind, a: &EntityId, b: &EntityId) -> Result<usize> {
        let mut keys = vec![edge_key(kind, a, b)?];
        let reverse = edge_key(kind, b, a)?;
        if reverse != keys[0] {
            keys.push(reverse);
        }

        let removed = (&self.edges, &self.by_node).transaction(
            |(edges, by_node)| -> ConflictableTransactionResult<usize> {
                let mut removed = 0;
                for key in &keys {
                    if edges.remove(key.as_bytes())?.is_some() {
                        by_node.remove(index_key(a, key))?;
                        by_node.remove(index_key(b, key))?;
                        removed += 1;
                    }
                }
                Ok(removed)
            },
        )?;

        Ok(removed)
    }

    pub fn find(&self, kind: &RelationKind, from: &EntityId, to: &EntityId) -> Result<Option<Edge>> {
        let key = edge_key(kind, from, to)?;
        match self.edges.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All edges with `node` on either side, in index order.
    pub fn incident(&self, node: &EntityId) -> Result<Vec<Edge>> {
        let prefix = prefix_key(node.as_str().as_bytes());
        let mut out = Vec::new();

        for entry in self.by_node.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let row = &key[prefix.len()..];
            // a concurrent remove may have dropped the edge after the index was read
            if let Some(bytes) = self.edges.get(row)? {
                out.push(from_cbor(&bytes)?);
            }
        }

        Ok(out)
    }

    pub fn all(&self) -> Result<Vec<Edge>> {
        self.edges
            .iter()
            .values()
            .map(|bytes| from_cbor(&bytes?))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn node(id: &str, ty: EntityType) -> NodeRef {
        NodeRef::new(EntityId::new(id).unwrap(), ty)
    }

    fn store() -> (tempfile::TempDir, EdgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("edges.db")).unwrap();
        (dir, EdgeStore::open(&db).unwrap())
    }

    #[test]
    fn edge_encoding() {
        let edge = Edge::new(
            RelationKind::new("blog_tour").unwrap(),
            node("b1", EntityType::Blog),
            node("t1", EntityType::Tour),
        );

        let encoded = minicbor::to_vec(&edge).unwrap();
        let decoded: Edge = minicbor::decode(&encoded).unwrap();

        assert_eq!(edge, decoded);
    }

    #[test]
    fn key_depends_on_orientation() {
        let kind = RelationKind::new("blog_tour").unwrap();
        let a = EntityId::new("a").unwrap();
        let b = EntityId::new("b").unwrap();

        assert_eq!(edge_key(&kind, &a, &b).unwrap(), edge_key(&kind, &a, &b).unwrap());
        assert_ne!(edge_key(&kind, &a, &b).unwrap(), edge_key(&kind, &b, &a).unwrap());
    }

    #[test]
    fn mirrored_insert_is_a_noop() {
        let (_dir, store) = store();
        let kind = RelationKind::new("blog_tour").unwrap();
        let forward = Edge::new(kind.clone(), node("b1", EntityType::Blog), node("t1", EntityType::Tour));
        let mirrored = Edge::new(kind, node("t1", EntityType::Tour), node("b1", EntityType::Blog));

        assert!(store.insert(&forward).unwrap());
        assert!(!store.insert(&mirrored).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn self_edge_is_indexed_once() {
        let (_dir, store) = store();
        let edge = Edge::new(
            RelationKind::new("blog_blog").unwrap(),
            node("b1", EntityType::Blog),
            node("b1", EntityType::Blog),
        );
        store.insert(&edge).unwrap();

        let incident = store.incident(&EntityId::new("b1").unwrap()).unwrap();
        assert_eq!(incident.len(), 1);

        let kind = RelationKind::new("blog_blog").unwrap();
        let b1 = EntityId::new("b1").unwrap();
        assert_eq!(store.remove_between(&kind, &b1, &b1).unwrap(), 1);
        assert!(store.incident(&b1).unwrap().is_empty());
    }
}
