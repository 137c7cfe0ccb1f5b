//! Core domain types for the Trellis knowledge graph.
//!
//! Identifiers are UUID newtypes so an entry id can never be passed where a
//! property fact id is expected. Schema enums mirror the string values stored
//! on `Property` nodes in Neo4j.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

// ── Identifiers ───────────────────────────────────────────────────

uuid_id!(
    /// Namespace boundary: every entry, entry type, and property belongs to one site.
    SiteId
);
uuid_id!(
    /// Immutable identifier of an entry.
    EntryId
);
uuid_id!(EntryTypeId);
uuid_id!(PropertyId);
uuid_id!(
    /// Identifier of one concrete value record attached to an entry.
    PropertyFactId
);
uuid_id!(
    /// The external bulk-sync source that pushes edits into a site.
    ConnectionId
);

// ── Schema ────────────────────────────────────────────────────────

/// What kind of value a property holds. Immutable once the property exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// A plain value; no graph edge is maintained.
    Value,
    /// An "is a" relationship, mirrored as an `IS_A` edge.
    RelIsA,
    /// Any other relationship, mirrored as a `RELATES_TO` edge.
    RelOther,
}

impl PropertyType {
    /// The string stored in `Property.type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "Value",
            Self::RelIsA => "RelIsA",
            Self::RelOther => "RelOther",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Value" => Some(Self::Value),
            "RelIsA" => Some(Self::RelIsA),
            "RelOther" => Some(Self::RelOther),
            _ => None,
        }
    }

    pub fn is_relationship(&self) -> bool {
        !matches!(self, Self::Value)
    }

    /// The direct edge type mirrored for facts of this property, if any.
    pub fn direct_rel_type(&self) -> Option<DirectRelType> {
        match self {
            Self::Value => None,
            Self::RelIsA => Some(DirectRelType::IsA),
            Self::RelOther => Some(DirectRelType::RelatesTo),
        }
    }
}

/// Graph-native edge type that mirrors a relationship fact between two entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectRelType {
    IsA,
    RelatesTo,
}

impl DirectRelType {
    /// Cypher relationship type.
    pub fn cypher_type(&self) -> &'static str {
        match self {
            Self::IsA => "IS_A",
            Self::RelatesTo => "RELATES_TO",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PropertyMode {
    #[default]
    Optional,
    Required,
    Auto,
}

// ── Entries ───────────────────────────────────────────────────────

/// The identifying fields of an entry, as returned by read paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: EntryId,
    pub name: String,
    pub key: String,
    pub entry_type_id: EntryTypeId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_type_round_trips_through_stored_string() {
        for t in [PropertyType::Value, PropertyType::RelIsA, PropertyType::RelOther] {
            assert_eq!(PropertyType::parse(t.as_str()), Some(t));
        }
        assert_eq!(PropertyType::parse("IS_A"), None);
    }

    #[test]
    fn only_relationship_types_have_direct_edges() {
        assert_eq!(PropertyType::Value.direct_rel_type(), None);
        assert_eq!(
            PropertyType::RelIsA.direct_rel_type().map(|t| t.cypher_type()),
            Some("IS_A")
        );
        assert_eq!(
            PropertyType::RelOther.direct_rel_type().map(|t| t.cypher_type()),
            Some("RELATES_TO")
        );
        assert!(!PropertyType::Value.is_relationship());
    }

    #[test]
    fn ids_parse_and_display() {
        let id = EntryId::new();
        let parsed: EntryId = format!(" {id} ").parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<EntryId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_uuid_strings() {
        let id = PropertyFactId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }
}
