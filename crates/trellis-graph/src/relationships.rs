//! Relationship fact reader.
//!
//! Lists the relationship facts touching an entry, grouped by relationship
//! property and direction. Each group is fetched one page at a time; an exact
//! total is only counted when the page does not already prove it.

use neo4rs::query;
use serde::Serialize;

use trellis_core::{EngineConfig, EntryId, EntrySummary, PropertyFactId, PropertyId, SiteId};

use crate::client::{field, id_field, GraphClient, GraphError};

/// Which end of the relationship the entry sits on.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelDirection {
    /// Facts owned by the entry, pointing at another entry.
    From,
    /// Facts owned by another entry, pointing at this one.
    To,
}

impl RelDirection {
    fn as_str(&self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            _ => None,
        }
    }

    /// Binds `entry`, `other`, `et`, `pf`, and `prop` for one group. Page and
    /// count queries both start from it so their totals agree.
    fn pattern(&self) -> &'static str {
        match self {
            Self::From => {
                "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})
                       -[:PROP_FACT]->(pf:PropertyFact)-[:FOR_PROP]->(prop:Property {id: $property_id})
                 MATCH (entry)-[rel]->(other:Entry)
                 WHERE id(rel) = pf.direct_rel_neo4j_id
                 MATCH (other)-[:IS_OF_TYPE]->(et:EntryType)"
            }
            Self::To => {
                "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})
                 MATCH (other:Entry)-[rel]->(entry)
                 MATCH (other)-[:PROP_FACT]->(pf:PropertyFact)-[:FOR_PROP]->(prop:Property {id: $property_id})
                 WHERE id(rel) = pf.direct_rel_neo4j_id
                 MATCH (other)-[:IS_OF_TYPE]->(et:EntryType)"
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipQuery {
    /// Restrict to one relationship property.
    pub rel_type_id: Option<PropertyId>,
    pub skip: usize,
    pub limit: usize,
}

impl RelationshipQuery {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            rel_type_id: None,
            skip: 0,
            limit: config.relationship_page_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelatedEntry {
    pub fact_id: PropertyFactId,
    pub property_id: PropertyId,
    /// The entry at the other end.
    pub entry: EntrySummary,
    pub note: String,
    pub slot: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelationshipGroup {
    pub property_id: PropertyId,
    pub property_name: String,
    pub direction: RelDirection,
    pub facts: Vec<RelatedEntry>,
    pub total_count: usize,
}

/// Whether a fetched page leaves the group total unknown.
pub fn needs_count(fetched: usize, limit: usize, skip: usize) -> bool {
    fetched == limit || skip > 0
}

impl GraphClient {
    /// Relationship facts of an entry in both directions, paged per group.
    pub async fn get_entry_direct_relationship_facts(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        rel_query: &RelationshipQuery,
    ) -> Result<Vec<RelationshipGroup>, GraphError> {
        let groups = self.relationship_groups(site_id, entry_id, rel_query).await?;

        let mut result = Vec::with_capacity(groups.len());
        for (property_id, property_name, direction) in groups {
            let facts = self
                .fetch_group(site_id, entry_id, property_id, direction, rel_query)
                .await?;
            let total_count = if needs_count(facts.len(), rel_query.limit, rel_query.skip) {
                self.count_group(site_id, entry_id, property_id, direction)
                    .await?
            } else {
                rel_query.skip + facts.len()
            };
            result.push(RelationshipGroup {
                property_id,
                property_name,
                direction,
                facts,
                total_count,
            });
        }

        tracing::debug!(%entry_id, groups = result.len(), "Read relationship facts");
        Ok(result)
    }

    async fn relationship_groups(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        rel_query: &RelationshipQuery,
    ) -> Result<Vec<(PropertyId, String, RelDirection)>, GraphError> {
        let q = query(
            "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})
             CALL {
                 WITH entry
                 MATCH (entry)-[:PROP_FACT]->(:PropertyFact)-[:FOR_PROP]->(prop:Property)
                 WHERE prop.type IN ['RelIsA', 'RelOther']
                   AND ($rel_type_id = '' OR prop.id = $rel_type_id)
                 RETURN DISTINCT prop, 'from' AS direction
                 UNION
                 WITH entry
                 MATCH (other:Entry)-[rel:IS_A|RELATES_TO]->(entry)
                 MATCH (other)-[:PROP_FACT]->(pf:PropertyFact)-[:FOR_PROP]->(prop:Property)
                 WHERE id(rel) = pf.direct_rel_neo4j_id
                   AND ($rel_type_id = '' OR prop.id = $rel_type_id)
                 RETURN DISTINCT prop, 'to' AS direction
             }
             RETURN prop.id AS property_id, coalesce(prop.name, '') AS property_name, direction
             ORDER BY property_name, direction",
        )
        .param("site_id", site_id.to_string())
        .param("entry_id", entry_id.to_string())
        .param(
            "rel_type_id",
            rel_query
                .rel_type_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        );

        let rows = self.query_rows(q).await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: String = field(row, "direction")?;
            let direction = RelDirection::parse(&raw)
                .ok_or_else(|| GraphError::Serialization(format!("Unknown direction {raw:?}")))?;
            groups.push((
                id_field(row, "property_id")?,
                field(row, "property_name")?,
                direction,
            ));
        }
        Ok(groups)
    }

    async fn fetch_group(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        property_id: PropertyId,
        direction: RelDirection,
        rel_query: &RelationshipQuery,
    ) -> Result<Vec<RelatedEntry>, GraphError> {
        let cypher = format!(
            "{pattern}
             RETURN pf.id AS fact_id, other.id AS other_id,
                    coalesce(other.name, '') AS other_name, coalesce(other.key, '') AS other_key,
                    et.id AS entry_type_id, coalesce(pf.note, '') AS note,
                    coalesce(pf.slot, '') AS slot, coalesce(pf.weight, 0.0) AS weight
             ORDER BY weight DESC, other_name ASC
             SKIP $skip LIMIT $limit",
            pattern = direction.pattern()
        );
        let q = query(&cypher)
            .param("site_id", site_id.to_string())
            .param("entry_id", entry_id.to_string())
            .param("property_id", property_id.to_string())
            .param("skip", rel_query.skip as i64)
            .param("limit", rel_query.limit as i64);

        let rows = self.query_rows(q).await?;
        rows.iter()
            .map(|row| {
                Ok(RelatedEntry {
                    fact_id: id_field(row, "fact_id")?,
                    property_id,
                    entry: EntrySummary {
                        id: id_field(row, "other_id")?,
                        name: field(row, "other_name")?,
                        key: field(row, "other_key")?,
                        entry_type_id: id_field(row, "entry_type_id")?,
                    },
                    note: field(row, "note")?,
                    slot: field(row, "slot")?,
                    weight: field(row, "weight")?,
                })
            })
            .collect()
    }

    async fn count_group(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        property_id: PropertyId,
        direction: RelDirection,
    ) -> Result<usize, GraphError> {
        let cypher = count_cypher(direction);
        let q = query(&cypher)
            .param("site_id", site_id.to_string())
            .param("entry_id", entry_id.to_string())
            .param("property_id", property_id.to_string());

        let total = match self.query_one(q).await? {
            Some(row) => field::<i64>(&row, "total")?,
            None => 0,
        };
        tracing::debug!(
            %entry_id,
            %property_id,
            direction = direction.as_str(),
            total,
            "Counted relationship group"
        );
        Ok(total.max(0) as usize)
    }
}

fn count_cypher(direction: RelDirection) -> String {
    format!("{} RETURN count(pf) AS total", direction.pattern())
}
