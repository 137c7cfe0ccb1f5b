//! Single-edit appliers for property facts.
//!
//! Each applier changes one entry's facts inside the caller's transaction and
//! keeps the mirrored edge of relationship facts in step via
//! [`RelationshipFactMirror`].

use neo4rs::query;
use uuid::Uuid;

use trellis_core::edits::{
    AddPropertyFact, DeletePropertyFact, OldValues, PropertyFactSnapshot, UpdatePropertyFact,
};
use trellis_core::{
    Edit, EditOutcome, EditResult, EntryId, PropertyFactId, PropertyId, PropertyType, SiteId,
    ValueExpression,
};

use crate::client::{field, parse_id, GraphError, GraphTxn};
use crate::error::{map_conflict, InvalidEdit, Result};
use crate::mirror::RelationshipFactMirror;

/// What the store knows about an (entry, property key) pair before adding a fact.
#[derive(Debug, Clone, Default)]
pub struct FactTargetCheck {
    pub entry_found: bool,
    pub entry_type_key: String,
    pub property: Option<(PropertyId, PropertyType)>,
    pub applicable: bool,
}

impl FactTargetCheck {
    /// Resolve to the property, or the most specific reason the edit is invalid.
    pub fn validate(
        self,
        entry_id: &EntryId,
        property_key: &str,
    ) -> std::result::Result<(PropertyId, PropertyType), InvalidEdit> {
        if !self.entry_found {
            return Err(InvalidEdit::EntryNotFound {
                entry_id: entry_id.to_string(),
            });
        }
        let Some(property) = self.property else {
            return Err(InvalidEdit::PropertyNotFound {
                property_key: property_key.to_string(),
            });
        };
        if !self.applicable {
            return Err(InvalidEdit::PropertyNotApplicable {
                property_key: property_key.to_string(),
                entry_type_key: self.entry_type_key,
            });
        }
        Ok(property)
    }
}

/// The target entry of a relationship value, or why it has none.
pub(crate) fn relationship_target(value: &ValueExpression) -> std::result::Result<EntryId, InvalidEdit> {
    value
        .target_entry()
        .ok_or_else(|| InvalidEdit::MalformedRelationshipValue {
            value: value.to_string(),
        })
}

/// Read a stored `Property.type` column.
pub(crate) fn property_type_field(
    row: &neo4rs::Row,
    key: &str,
) -> std::result::Result<PropertyType, GraphError> {
    let raw: String = field(row, key)?;
    PropertyType::parse(&raw)
        .ok_or_else(|| GraphError::Serialization(format!("Unknown property type {raw:?}")))
}

/// Add one fact to an entry, mirroring it as a direct edge when it is a relationship.
pub async fn add_property_fact(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edit: &AddPropertyFact,
) -> Result<EditResult> {
    let check = check_fact_target(txn, site_id, &edit.entry_id, &edit.property_key).await?;
    let (property_id, property_type) = check.validate(&edit.entry_id, &edit.property_key)?;

    let mirror = property_type.direct_rel_type().map(RelationshipFactMirror::new);
    let target = match mirror {
        Some(_) => Some(relationship_target(&edit.value_expression)?),
        None => None,
    };

    let q = query(
        "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})
         MATCH (prop:Property {id: $property_id})
         OPTIONAL MATCH (entry)-[:PROP_FACT]->(existing:PropertyFact)-[:FOR_PROP]->(prop)
         WITH entry, prop, max(existing.rank) AS max_rank
         CREATE (entry)-[:PROP_FACT]->(pf:PropertyFact {
             id: $fact_id, value_expression: $value_expression,
             note: $note, slot: $slot,
             rank: CASE WHEN $has_rank THEN $rank ELSE coalesce(max_rank, 0) + 1 END
         })-[:FOR_PROP]->(prop)
         SET pf.weight = CASE WHEN $has_weight THEN $weight ELSE null END
         RETURN pf.rank AS rank",
    )
    .param("site_id", site_id.to_string())
    .param("entry_id", edit.entry_id.to_string())
    .param("property_id", property_id.to_string())
    .param("fact_id", edit.property_fact_id.to_string())
    .param("value_expression", edit.value_expression.to_string())
    .param("note", edit.note.clone())
    .param("slot", edit.slot.clone())
    .param("has_rank", edit.rank.is_some())
    .param("rank", edit.rank.unwrap_or(0))
    .param("has_weight", edit.weight.is_some())
    .param("weight", edit.weight.unwrap_or(0.0));

    let row = txn
        .query_one(q)
        .await
        .map_err(|e| map_conflict(e, format!("property fact {}", edit.property_fact_id)))?
        .ok_or_else(|| InvalidEdit::EntryNotFound {
            entry_id: edit.entry_id.to_string(),
        })?;
    let rank: i64 = field(&row, "rank")?;

    if let (Some(mirror), Some(target)) = (mirror, target) {
        mirror
            .create(txn, site_id, edit.property_fact_id, edit.entry_id, target)
            .await?;
    }

    tracing::debug!(
        entry_id = %edit.entry_id,
        fact_id = %edit.property_fact_id,
        property_key = %edit.property_key,
        rank,
        "Added property fact"
    );

    let applied = AddPropertyFact {
        rank: Some(rank),
        ..edit.clone()
    };
    Ok(EditResult::Applied(EditOutcome {
        modified_nodes: vec![edit.entry_id.0, edit.property_fact_id.0],
        old_values: None,
        applied_edits: vec![Edit::AddPropertyFact(applied)],
    }))
}

async fn check_fact_target(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    entry_id: &EntryId,
    property_key: &str,
) -> Result<FactTargetCheck> {
    let q = query(
        "OPTIONAL MATCH (entry:Entry {id: $entry_id, site_id: $site_id})-[:IS_OF_TYPE]->(et:EntryType)
         OPTIONAL MATCH (prop:Property {key: $property_key, site_id: $site_id})
         OPTIONAL MATCH (prop)-[applies:APPLIES_TO_TYPE]->(et)
         RETURN entry IS NOT NULL AS entry_found, coalesce(et.key, '') AS entry_type_key,
                prop.id AS property_id, prop.type AS property_type,
                applies IS NOT NULL AS applicable
         LIMIT 1",
    )
    .param("site_id", site_id.to_string())
    .param("entry_id", entry_id.to_string())
    .param("property_key", property_key.to_string());

    let Some(row) = txn.query_one(q).await? else {
        return Ok(FactTargetCheck::default());
    };

    let property = match field::<Option<String>>(&row, "property_id")? {
        Some(raw) => Some((parse_id(&raw)?, property_type_field(&row, "property_type")?)),
        None => None,
    };

    Ok(FactTargetCheck {
        entry_found: field(&row, "entry_found")?,
        entry_type_key: field(&row, "entry_type_key")?,
        property,
        applicable: field(&row, "applicable")?,
    })
}

/// The current state of a fact owned by an entry in the site.
struct CurrentFact {
    snapshot: PropertyFactSnapshot,
    property_type: PropertyType,
}

async fn load_fact(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    entry_id: &EntryId,
    fact_id: &PropertyFactId,
) -> Result<Option<CurrentFact>> {
    let q = query(
        "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})
               -[:PROP_FACT]->(pf:PropertyFact {id: $fact_id})-[:FOR_PROP]->(prop:Property)
         RETURN pf.value_expression AS value_expression,
                coalesce(pf.note, '') AS note, coalesce(pf.slot, '') AS slot,
                coalesce(pf.rank, 0) AS rank, pf.weight AS weight,
                prop.type AS property_type",
    )
    .param("site_id", site_id.to_string())
    .param("entry_id", entry_id.to_string())
    .param("fact_id", fact_id.to_string());

    let Some(row) = txn.query_one(q).await? else {
        return Ok(None);
    };
    let value: String = field(&row, "value_expression")?;
    let property_type = property_type_field(&row, "property_type")?;

    Ok(Some(CurrentFact {
        snapshot: PropertyFactSnapshot {
            value_expression: ValueExpression::parse(&value),
            note: field(&row, "note")?,
            rank: field(&row, "rank")?,
            slot: field(&row, "slot")?,
            weight: field(&row, "weight")?,
        },
        property_type,
    }))
}

/// Change the supplied fields of a fact. An edit with no fields has no effect.
pub async fn update_property_fact(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edit: &UpdatePropertyFact,
) -> Result<EditResult> {
    if edit.is_empty() {
        return Ok(EditResult::HadNoEffect);
    }

    let current = load_fact(txn, site_id, &edit.entry_id, &edit.property_fact_id)
        .await?
        .ok_or_else(|| InvalidEdit::PropertyFactNotFound {
            fact_id: edit.property_fact_id.to_string(),
            entry_id: edit.entry_id.to_string(),
        })?;

    let mut assignments = Vec::new();
    let mut q_params: Vec<(&str, neo4rs::BoltType)> = Vec::new();
    if let Some(value) = &edit.value_expression {
        assignments.push("pf.value_expression = $value_expression");
        q_params.push(("value_expression", value.to_string().into()));
    }
    if let Some(note) = &edit.note {
        assignments.push("pf.note = $note");
        q_params.push(("note", note.clone().into()));
    }
    if let Some(rank) = edit.rank {
        assignments.push("pf.rank = $rank");
        q_params.push(("rank", rank.into()));
    }
    if let Some(slot) = &edit.slot {
        assignments.push("pf.slot = $slot");
        q_params.push(("slot", slot.clone().into()));
    }
    if let Some(weight) = edit.weight {
        assignments.push("pf.weight = $weight");
        q_params.push(("weight", weight.into()));
    }

    let cypher = format!(
        "MATCH (pf:PropertyFact {{id: $fact_id}}) SET {}",
        assignments.join(", ")
    );
    let mut q = query(&cypher).param("fact_id", edit.property_fact_id.to_string());
    for (key, value) in q_params {
        q = q.param(key, value);
    }
    txn.run(q).await?;

    let value_changed = edit
        .value_expression
        .as_ref()
        .is_some_and(|v| *v != current.snapshot.value_expression);
    if let (true, Some(rel_type)) = (value_changed, current.property_type.direct_rel_type()) {
        if let Some(new_value) = &edit.value_expression {
            let target = relationship_target(new_value)?;
            RelationshipFactMirror::new(rel_type)
                .replace(txn, site_id, edit.property_fact_id, edit.entry_id, target)
                .await?;
        }
    }

    tracing::debug!(
        entry_id = %edit.entry_id,
        fact_id = %edit.property_fact_id,
        value_changed,
        "Updated property fact"
    );

    Ok(EditResult::Applied(EditOutcome {
        modified_nodes: vec![edit.entry_id.0, edit.property_fact_id.0],
        old_values: Some(OldValues::PropertyFact(current.snapshot)),
        applied_edits: vec![Edit::UpdatePropertyFact(edit.clone())],
    }))
}

/// Delete a fact and its mirrored edge. Deleting a missing fact has no effect.
pub async fn delete_property_fact(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edit: &DeletePropertyFact,
) -> Result<EditResult> {
    let q = query(
        "MATCH (entry:Entry {id: $entry_id, site_id: $site_id})
         RETURN entry.id AS id",
    )
    .param("site_id", site_id.to_string())
    .param("entry_id", edit.entry_id.to_string());
    if txn.query_one(q).await?.is_none() {
        return Err(InvalidEdit::EntryNotFound {
            entry_id: edit.entry_id.to_string(),
        }
        .into());
    }

    let Some(current) = load_fact(txn, site_id, &edit.entry_id, &edit.property_fact_id).await? else {
        return Ok(EditResult::HadNoEffect);
    };

    delete_facts(txn, &[edit.property_fact_id]).await?;

    tracing::debug!(
        entry_id = %edit.entry_id,
        fact_id = %edit.property_fact_id,
        "Deleted property fact"
    );

    Ok(EditResult::Applied(EditOutcome {
        modified_nodes: vec![edit.entry_id.0, edit.property_fact_id.0],
        old_values: Some(OldValues::PropertyFact(current.snapshot)),
        applied_edits: vec![Edit::DeletePropertyFact(edit.clone())],
    }))
}

/// Delete fact nodes together with any mirrored edges.
pub(crate) async fn delete_facts(
    txn: &mut GraphTxn,
    fact_ids: &[PropertyFactId],
) -> Result<()> {
    if fact_ids.is_empty() {
        return Ok(());
    }
    RelationshipFactMirror::delete(txn, fact_ids).await?;

    let ids: Vec<String> = fact_ids.iter().map(ToString::to_string).collect();
    let q = query(
        "UNWIND $fact_ids AS fact_id
         MATCH (pf:PropertyFact {id: fact_id})
         DETACH DELETE pf",
    )
    .param("fact_ids", ids);
    txn.run(q).await?;
    Ok(())
}

/// Node ids touched by a set of facts and their owning entries, deduplicated in order.
pub(crate) fn touched_nodes(pairs: impl IntoIterator<Item = (EntryId, PropertyFactId)>) -> Vec<Uuid> {
    let mut nodes = Vec::new();
    for (entry, fact) in pairs {
        for id in [entry.0, fact.0] {
            if !nodes.contains(&id) {
                nodes.push(id);
            }
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check() -> FactTargetCheck {
        FactTargetCheck {
            entry_found: true,
            entry_type_key: "species".to_string(),
            property: Some((PropertyId::new(), PropertyType::RelIsA)),
            applicable: true,
        }
    }

    #[test]
    fn test_valid_target_resolves_property() {
        let (_, property_type) = check().validate(&EntryId::new(), "parent-genus").unwrap();
        assert_eq!(property_type, PropertyType::RelIsA);
    }

    #[test]
    fn test_missing_entry_reported_first() {
        let err = FactTargetCheck::default()
            .validate(&EntryId::new(), "parent-genus")
            .unwrap_err();
        assert!(matches!(err, InvalidEdit::EntryNotFound { .. }));
    }

    #[test]
    fn test_missing_property() {
        let err = FactTargetCheck {
            property: None,
            ..check()
        }
        .validate(&EntryId::new(), "nope")
        .unwrap_err();
        assert_eq!(
            err,
            InvalidEdit::PropertyNotFound {
                property_key: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_inapplicable_property_names_entry_type() {
        let err = FactTargetCheck {
            applicable: false,
            ..check()
        }
        .validate(&EntryId::new(), "parent-genus")
        .unwrap_err();
        assert_eq!(
            err,
            InvalidEdit::PropertyNotApplicable {
                property_key: "parent-genus".to_string(),
                entry_type_key: "species".to_string(),
            }
        );
    }

    #[test]
    fn test_relationship_value_must_reference_entry() {
        let target = EntryId::new();
        assert_eq!(
            relationship_target(&ValueExpression::entry(target)).unwrap(),
            target
        );
        let err = relationship_target(&ValueExpression::parse("\"oak\"")).unwrap_err();
        assert!(matches!(err, InvalidEdit::MalformedRelationshipValue { .. }));
    }

    #[test]
    fn test_touched_nodes_deduplicates_entries() {
        let entry = EntryId::new();
        let f1 = PropertyFactId::new();
        let f2 = PropertyFactId::new();
        let nodes = touched_nodes([(entry, f1), (entry, f2)]);
        assert_eq!(nodes, vec![entry.0, f1.0, f2.0]);
    }
}
