//! Declarative map from `(owner type, field name)` to edge kind and counterpart
//!
//! Each relation pair is declared once and both owner types read their field
//! from the same entry, so the two sides can never disagree about the kind.
use crate::error::ConfigurationError;
use crate::types::{EntityType, RelationKind};
use std::collections::BTreeSet;

/// One side of a relation pair: the owning type and the field it exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationSide {
    pub owner: EntityType,
    pub field: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationPair {
    pub kind: &'static str,
    pub left: RelationSide,
    pub right: RelationSide,
}

const fn pair(
    kind: &'static str,
    left: (EntityType, &'static str),
    right: (EntityType, &'static str),
) -> RelationPair {
    RelationPair {
        kind,
        left: RelationSide {
            owner: left.0,
            field: left.1,
        },
        right: RelationSide {
            owner: right.0,
            field: right.1,
        },
    }
}

pub const STANDARD_RELATIONS: &[RelationPair] = &[
    pair("blog_destination", (EntityType::Blog, "destinations"), (EntityType::Destination, "blogs")),
    pair("blog_tour", (EntityType::Blog, "tours"), (EntityType::Tour, "blogs")),
    pair("blog_blog", (EntityType::Blog, "blogs"), (EntityType::Blog, "blogs")),
    pair("blog_month", (EntityType::Blog, "tagMonths"), (EntityType::Month, "tagBlogs")),
    pair("blog_category", (EntityType::Blog, "categories"), (EntityType::Category, "blogs")),
    pair("destination_tour", (EntityType::Destination, "tours"), (EntityType::Tour, "destinations")),
    pair("destination_month", (EntityType::Destination, "tagMonths"), (EntityType::Month, "tagDestinations")),
    pair("tour_month", (EntityType::Tour, "tagMonths"), (EntityType::Month, "tagTours")),
    pair("tour_tour", (EntityType::Tour, "tours"), (EntityType::Tour, "tours")),
];

/// What a relation field resolves to from its owner's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: &'static str,
    pub kind: RelationKind,
    pub counterpart: EntityType,
}

#[derive(Debug, Clone)]
pub struct RelationRegistry {
    pairs: &'static [RelationPair],
}

impl RelationRegistry {
    /// Build a registry over `pairs`, rejecting tables where a kind repeats or
    /// an owner reaches the same counterpart type through two fields.
    pub fn new(pairs: &'static [RelationPair]) -> Result<Self, ConfigurationError> {
        let mut kinds = BTreeSet::new();
        let mut reach = BTreeSet::new();

        for p in pairs {
            if !kinds.insert(p.kind) {
                return Err(ConfigurationError::DuplicateKind(p.kind.to_owned()));
            }
            let mut sides = vec![(p.left.owner, p.right.owner)];
            if p.left != p.right {
                sides.push((p.right.owner, p.left.owner));
            }
            for (owner, counterpart) in sides {
                if !reach.insert((owner, counterpart)) {
                    return Err(ConfigurationError::AmbiguousCounterpart {
                        owner: owner.to_string(),
                        counterpart: counterpart.to_string(),
                    });
                }
            }
        }

        Ok(Self { pairs })
    }

    pub fn standard() -> Self {
        Self {
            pairs: STANDARD_RELATIONS,
        }
    }

    pub fn pairs(&self) -> &'static [RelationPair] {
        self.pairs
    }

    /// `None` means `field` is not a relation field of `owner`.
    pub fn field(&self, owner: EntityType, field: &str) -> Option<FieldMapping> {
        self.fields_for(owner).into_iter().find(|m| m.field == field)
    }

    /// Like [`field`](Self::field), for callers that name the field explicitly.
    pub fn require_field(
        &self,
        owner: EntityType,
        field: &str,
    ) -> Result<FieldMapping, ConfigurationError> {
        self.field(owner, field)
            .ok_or_else(|| ConfigurationError::UnknownRelationField {
                owner: owner.to_string(),
                field: field.to_owned(),
            })
    }

    /// Every relation field `owner` exposes, in declaration order.
    pub fn fields_for(&self, owner: EntityType) -> Vec<FieldMapping> {
        let mut out = Vec::new();
        for p in self.pairs {
            // kinds in a static table are non-empty literals
            let Ok(kind) = RelationKind::new(p.kind) else {
                continue;
            };
            if p.left.owner == owner {
                out.push(FieldMapping {
                    field: p.left.field,
                    kind: kind.clone(),
                    counterpart: p.right.owner,
                });
            }
            if p.right.owner == owner && p.right != p.left {
                out.push(FieldMapping {
                    field: p.right.field,
                    kind,
                    counterpart: p.left.owner,
                });
            }
        }
        out
    }

    pub fn pair_for_kind(&self, kind: &RelationKind) -> Option<&'static RelationPair> {
        self.pairs.iter().find(|p| p.kind == kind.as_str())
    }
}

impl Default for RelationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_consistent() {
        assert!(RelationRegistry::new(STANDARD_RELATIONS).is_ok());
    }

    #[test]
    fn both_sides_share_the_kind() {
        let registry = RelationRegistry::standard();
        let blog = registry.field(EntityType::Blog, "destinations").unwrap();
        let dest = registry.field(EntityType::Destination, "blogs").unwrap();

        assert_eq!(blog.kind, dest.kind);
        assert_eq!(blog.counterpart, EntityType::Destination);
        assert_eq!(dest.counterpart, EntityType::Blog);
    }

    #[test]
    fn month_and_tour_agree_on_kind() {
        let registry = RelationRegistry::standard();
        let month = registry.field(EntityType::Month, "tagTours").unwrap();
        let tour = registry.field(EntityType::Tour, "tagMonths").unwrap();
        assert_eq!(month.kind, tour.kind);
    }

    #[test]
    fn self_relation_appears_once() {
        let registry = RelationRegistry::standard();
        let blog_fields: Vec<_> = registry
            .fields_for(EntityType::Blog)
            .into_iter()
            .map(|m| m.field)
            .collect();

        assert_eq!(
            blog_fields,
            vec!["destinations", "tours", "blogs", "tagMonths", "categories"]
        );
    }

    #[test]
    fn unknown_field_is_not_found() {
        let registry = RelationRegistry::standard();
        assert!(registry.field(EntityType::Category, "tours").is_none());
        assert_eq!(
            registry.require_field(EntityType::Category, "tours"),
            Err(ConfigurationError::UnknownRelationField {
                owner: "Category".into(),
                field: "tours".into(),
            })
        );
    }

    #[test]
    fn duplicate_kinds_are_rejected() {
        static BAD: &[RelationPair] = &[
            pair("x", (EntityType::Blog, "tours"), (EntityType::Tour, "blogs")),
            pair("x", (EntityType::Blog, "months"), (EntityType::Month, "blogs")),
        ];
        assert_eq!(
            RelationRegistry::new(BAD).unwrap_err(),
            ConfigurationError::DuplicateKind("x".into())
        );
    }

    #[test]
    fn ambiguous_counterparts_are_rejected() {
        static BAD: &[RelationPair] = &[
            pair("a", (EntityType::Blog, "tours"), (EntityType::Tour, "blogs")),
            pair("b", (EntityType::Blog, "moreTours"), (EntityType::Tour, "moreBlogs")),
        ];
        assert!(matches!(
            RelationRegistry::new(BAD),
            Err(ConfigurationError::AmbiguousCounterpart { .. })
        ));
    }
}
