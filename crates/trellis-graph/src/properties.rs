//! Property value resolution: own, inherited, and defaulted values.
//!
//! For each property applicable to an entry, the facts of the closest entry
//! (the entry itself at distance 0, else its nearest ancestors for inheritable
//! properties) fully replace any farther values. Ancestors tied at the closest
//! distance all contribute their facts.

use std::collections::HashMap;

use neo4rs::query;
use serde::Serialize;

use trellis_core::{EngineConfig, EntryId, PropertyFactId, PropertyId, SiteId, ValueExpression};

use crate::client::{field, id_field, GraphClient, GraphError};

/// Paging and filtering for a property listing.
#[derive(Debug, Clone)]
pub struct PropertyQuery {
    /// Properties whose importance (rank) is greater are skipped.
    pub max_importance: i64,
    pub skip: usize,
    pub limit: usize,
    pub specific_property_id: Option<PropertyId>,
}

impl PropertyQuery {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_importance: config.default_max_importance,
            skip: 0,
            limit: config.default_page_limit,
            specific_property_id: None,
        }
    }

    /// The query for a single property regardless of importance.
    pub fn single(property_id: PropertyId) -> Self {
        Self {
            max_importance: i64::MAX,
            skip: 0,
            limit: 1,
            specific_property_id: Some(property_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PropertySummary {
    pub id: PropertyId,
    pub name: String,
    pub importance: i64,
    pub default: String,
}

/// Where a resolved fact was defined.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "from")]
pub enum FactSource {
    ThisEntry,
    AncestorEntry { entry_id: EntryId },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedFact {
    pub fact_id: PropertyFactId,
    pub value_expression: ValueExpression,
    pub note: String,
    pub slot: String,
    pub rank: i64,
    pub source: FactSource,
}

/// A property and the facts that supply its value on one entry.
///
/// `facts` is empty when only the property default applies.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryPropertyValueSet {
    pub property: PropertySummary,
    pub facts: Vec<ResolvedFact>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PropertyPage {
    pub items: Vec<EntryPropertyValueSet>,
    /// Number of results before `skip`/`limit`.
    pub total_count: usize,
}

/// A property applicable to the entry's type.
#[derive(Debug, Clone)]
pub struct CandidateProperty {
    pub summary: PropertySummary,
    pub inheritable: bool,
}

/// A fact found on the entry or one of its ancestors.
#[derive(Debug, Clone)]
pub struct CandidateFact {
    pub property_id: PropertyId,
    pub entry_id: EntryId,
    pub distance: u32,
    pub fact_id: PropertyFactId,
    pub value_expression: ValueExpression,
    pub note: String,
    pub slot: String,
    pub rank: i64,
}

/// Apply closest-ancestor-wins, defaults, ordering, and paging.
pub fn resolve_property_values(
    properties: Vec<CandidateProperty>,
    facts: Vec<CandidateFact>,
    query: &PropertyQuery,
) -> PropertyPage {
    let mut by_property: HashMap<PropertyId, Vec<CandidateFact>> = HashMap::new();
    for fact in facts {
        by_property.entry(fact.property_id).or_default().push(fact);
    }

    let mut results: Vec<EntryPropertyValueSet> = properties
        .into_iter()
        .filter(|p| p.summary.importance <= query.max_importance)
        .filter(|p| {
            query
                .specific_property_id
                .map_or(true, |id| id == p.summary.id)
        })
        .filter_map(|p| {
            let mut visible: Vec<CandidateFact> = by_property
                .remove(&p.summary.id)
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f.distance == 0 || p.inheritable)
                .collect();

            if let Some(closest) = visible.iter().map(|f| f.distance).min() {
                visible.retain(|f| f.distance == closest);
            }

            if visible.is_empty() && p.summary.default.is_empty() {
                return None;
            }

            visible.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.fact_id.cmp(&b.fact_id)));
            let facts = visible
                .into_iter()
                .map(|f| ResolvedFact {
                    fact_id: f.fact_id,
                    value_expression: f.value_expression,
                    note: f.note,
                    slot: f.slot,
                    rank: f.rank,
                    source: if f.distance == 0 {
                        FactSource::ThisEntry
                    } else {
                        FactSource::AncestorEntry {
                            entry_id: f.entry_id,
                        }
                    },
                })
                .collect();

            Some(EntryPropertyValueSet {
                property: p.summary,
                facts,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        a.property
            .importance
            .cmp(&b.property.importance)
            .then_with(|| a.property.name.cmp(&b.property.name))
    });

    let total_count = results.len();
    let items = results
        .into_iter()
        .skip(query.skip)
        .take(query.limit)
        .collect();

    PropertyPage { items, total_count }
}

impl GraphClient {
    /// Every property value that applies to an entry, paged.
    pub async fn get_entry_properties(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        query: &PropertyQuery,
        max_depth: u32,
    ) -> Result<PropertyPage, GraphError> {
        let properties = self.applicable_properties(site_id, entry_id, query).await?;
        if properties.is_empty() {
            return Ok(PropertyPage {
                items: Vec::new(),
                total_count: 0,
            });
        }

        let mut distances: HashMap<EntryId, u32> = HashMap::from([(*entry_id, 0)]);
        if properties.iter().any(|p| p.inheritable) {
            for ancestor in self.get_ancestors(site_id, entry_id, max_depth).await? {
                distances.insert(ancestor.entry.id, ancestor.distance);
            }
        }

        let property_ids: Vec<PropertyId> = properties.iter().map(|p| p.summary.id).collect();
        let facts = self
            .candidate_facts(site_id, &distances, &property_ids)
            .await?;

        Ok(resolve_property_values(properties, facts, query))
    }

    /// The value of one property on an entry, if it has facts or a default.
    pub async fn get_entry_property(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        property_id: &PropertyId,
        max_depth: u32,
    ) -> Result<Option<EntryPropertyValueSet>, GraphError> {
        let page = self
            .get_entry_properties(site_id, entry_id, &PropertyQuery::single(*property_id), max_depth)
            .await?;
        Ok(page.items.into_iter().next())
    }

    async fn applicable_properties(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        query: &PropertyQuery,
    ) -> Result<Vec<CandidateProperty>, GraphError> {
        let q = neo4rs::query(
            "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})-[:IS_OF_TYPE]->(et:EntryType)
             MATCH (prop:Property {site_id: $site_id})-[:APPLIES_TO_TYPE]->(et)
             WHERE coalesce(prop.rank, 0) <= $max_importance
               AND ($property_id = '' OR prop.id = $property_id)
             RETURN prop.id AS id, prop.name AS name,
                    coalesce(prop.rank, 0) AS importance,
                    coalesce(prop.default, '') AS default,
                    coalesce(prop.inheritable, false) AS inheritable",
        )
        .param("site_id", site_id.to_string())
        .param("entry_id", entry_id.to_string())
        .param("max_importance", query.max_importance)
        .param(
            "property_id",
            query
                .specific_property_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        );

        let rows = self.query_rows(q).await?;
        rows.iter()
            .map(|row| {
                Ok(CandidateProperty {
                    summary: PropertySummary {
                        id: id_field(row, "id")?,
                        name: field::<Option<String>>(row, "name")?.unwrap_or_default(),
                        importance: field(row, "importance")?,
                        default: field(row, "default")?,
                    },
                    inheritable: field(row, "inheritable")?,
                })
            })
            .collect()
    }

    async fn candidate_facts(
        &self,
        site_id: &SiteId,
        distances: &HashMap<EntryId, u32>,
        property_ids: &[PropertyId],
    ) -> Result<Vec<CandidateFact>, GraphError> {
        let entry_ids: Vec<String> = distances.keys().map(ToString::to_string).collect();
        let property_ids: Vec<String> = property_ids.iter().map(ToString::to_string).collect();

        let q = query(
            "MATCH (e:Entry {site_id: $site_id})-[:PROP_FACT]->(pf:PropertyFact)-[:FOR_PROP]->(prop:Property)
             WHERE e.id IN $entry_ids AND prop.id IN $property_ids
             RETURN prop.id AS property_id, e.id AS entry_id, pf.id AS fact_id,
                    pf.value_expression AS value_expression,
                    coalesce(pf.note, '') AS note, coalesce(pf.slot, '') AS slot,
                    coalesce(pf.rank, 0) AS rank",
        )
        .param("site_id", site_id.to_string())
        .param("entry_ids", entry_ids)
        .param("property_ids", property_ids);

        let rows = self.query_rows(q).await?;
        let mut facts = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry_id: EntryId = id_field(row, "entry_id")?;
            let Some(&distance) = distances.get(&entry_id) else {
                continue;
            };
            let value: String = field(row, "value_expression")?;
            facts.push(CandidateFact {
                property_id: id_field(row, "property_id")?,
                entry_id,
                distance,
                fact_id: id_field(row, "fact_id")?,
                value_expression: ValueExpression::parse(&value),
                note: field(row, "note")?,
                slot: field(row, "slot")?,
                rank: field(row, "rank")?,
            });
        }
        Ok(facts)
    }
}
