//! Shared identity, type and time primitives
use crate::error::{ConfigurationError, ValidationError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;
use uuid7::uuid7;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// `Utc` itself is not ordered, so the derive would never apply
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn minus(&self, span: Duration) -> Self {
        Self(self.0 - span)
    }
    pub fn plus(&self, span: Duration) -> Self {
        Self(self.0 + span)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp<Utc> {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Opaque id of a content entity or booking.
///
/// Ids are used as sled key prefixes with a NUL separator, so the empty string
/// and ids carrying NUL bytes are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() || id.contains('\0') {
            return Err(ValidationError::InvalidId(id));
        }
        Ok(Self(id))
    }
    /// Fresh time-ordered id
    pub fn generate() -> Self {
        Self(uuid7().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for EntityId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for EntityId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(EntityId(d.str()?.to_owned()))
    }
}

/// The closed set of content types that can appear on either side of an edge.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum EntityType {
    #[n(0)]
    Blog,
    #[n(1)]
    Tour,
    #[n(2)]
    Destination,
    #[n(3)]
    Month,
    #[n(4)]
    Category,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Blog,
        EntityType::Tour,
        EntityType::Destination,
        EntityType::Month,
        EntityType::Category,
    ];

    /// Accepts type names and the lowercase singular/plural forms used by routes.
    pub fn parse(name: &str) -> Result<Self, ConfigurationError> {
        match name.trim().to_lowercase().as_str() {
            "blog" | "blogs" => Ok(EntityType::Blog),
            "tour" | "tours" => Ok(EntityType::Tour),
            "destination" | "destinations" => Ok(EntityType::Destination),
            "month" | "months" => Ok(EntityType::Month),
            "category" | "categories" => Ok(EntityType::Category),
            _ => Err(ConfigurationError::UnknownEntityType(name.to_owned())),
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Blog => "Blog",
            EntityType::Tour => "Tour",
            EntityType::Destination => "Destination",
            EntityType::Month => "Month",
            EntityType::Category => "Category",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::parse(s)
    }
}

/// Normalised (trimmed, lowercase) relation kind such as `blog_tour`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationKind(String);

impl RelationKind {
    pub fn new(kind: &str) -> Result<Self, ValidationError> {
        let kind = kind.trim().to_lowercase();
        if kind.is_empty() {
            return Err(ValidationError::EmptyKind);
        }
        Ok(Self(kind))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for RelationKind {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for RelationKind {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(RelationKind(d.str()?.to_owned()))
    }
}

/// One endpoint of an edge.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    #[n(0)]
    pub id: EntityId,
    #[n(1)]
    pub entity_type: EntityType,
}

impl NodeRef {
    pub fn new(id: EntityId, entity_type: EntityType) -> Self {
        Self { id, entity_type }
    }
    /// Parse an endpoint from request-shaped strings.
    pub fn parse(id: &str, entity_type: &str) -> crate::error::Result<Self> {
        let entity_type = EntityType::parse(entity_type)?;
        Ok(NodeRef::new(EntityId::new(id)?, entity_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_by_instant() {
        let earlier = TimeStamp::new_with(2026, 12, 24, 0, 0, 0).unwrap();
        let later = earlier.plus(Duration::seconds(1));

        assert!(earlier < later);
        assert!(later.minus(Duration::seconds(1)) <= earlier);
        assert_eq!(earlier.cmp(&earlier.clone()), std::cmp::Ordering::Equal);
        assert_eq!(std::cmp::max(later.clone(), earlier), later);
    }

    #[test]
    fn entity_type_accepts_route_spellings() {
        assert_eq!(EntityType::parse("blogs").unwrap(), EntityType::Blog);
        assert_eq!(EntityType::parse("Tour").unwrap(), EntityType::Tour);
        assert_eq!(
            EntityType::parse("categories").unwrap(),
            EntityType::Category
        );
        assert!(matches!(
            EntityType::parse("user"),
            Err(ConfigurationError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn relation_kind_is_normalised() {
        let kind = RelationKind::new("  Blog_Tour ").unwrap();
        assert_eq!(kind.as_str(), "blog_tour");
        assert_eq!(RelationKind::new("   "), Err(ValidationError::EmptyKind));
    }

    #[test]
    fn entity_id_rejects_blank_and_nul() {
        assert!(EntityId::new("").is_err());
        assert!(EntityId::new("a\0b").is_err());
        assert_eq!(EntityId::new("65f0c1").unwrap().as_str(), "65f0c1");
    }
}
