//! Bulk reconciliation of relationship properties to a desired end state.
//!
//! Resolves every entry, property, and target of the batch in set-based
//! queries, computes a [`RelationshipDiff`] against current facts, then applies
//! the diff. Everything happens on the caller's transaction, so a rejected
//! batch leaves no trace.

use std::collections::HashMap;

use neo4rs::query;
use serde::Serialize;

use trellis_core::edits::{
    AddPropertyFact, DeletePropertyFact, EntryLocator, OldValues, PropertyFactSnapshot,
    SetRelationships,
};
use trellis_core::{
    DirectRelType, Edit, EditOutcome, EntryId, PropertyFactId, PropertyId, SiteId, ValueExpression,
};

use crate::client::{field, id_field, parse_id, to_json, GraphTxn};
use crate::error::{InvalidEdit, Result};
use crate::facts::{delete_facts, property_type_field, touched_nodes, FactTargetCheck};
use crate::mirror::{MirrorEdge, RelationshipFactMirror};

/// A fact currently stored for an (entry, property) pair.
#[derive(Debug, Clone)]
pub struct ExistingFact {
    pub fact_id: PropertyFactId,
    pub snapshot: PropertyFactSnapshot,
}

/// One desired relationship; `rank` is its 1-based position in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredFact {
    pub target: EntryId,
    pub note: String,
    pub slot: String,
    pub rank: i64,
}

/// Current and desired facts of one relationship property on one entry.
#[derive(Debug, Clone)]
pub struct PairState {
    pub entry_id: EntryId,
    pub property_id: PropertyId,
    pub property_key: String,
    pub rel_type: DirectRelType,
    pub current: Vec<ExistingFact>,
    pub desired: Vec<DesiredFact>,
}

#[derive(Debug, Clone)]
pub struct NewFact {
    pub fact_id: PropertyFactId,
    pub entry_id: EntryId,
    pub property_id: PropertyId,
    pub property_key: String,
    pub rel_type: DirectRelType,
    pub target: EntryId,
    pub note: String,
    pub slot: String,
    pub rank: i64,
}

#[derive(Debug, Clone)]
pub struct RemovedFact {
    pub entry_id: EntryId,
    pub fact_id: PropertyFactId,
    pub snapshot: PropertyFactSnapshot,
}

/// The minimal change set that turns current facts into the desired ones.
#[derive(Debug, Clone, Default)]
pub struct RelationshipDiff {
    pub keep: Vec<PropertyFactId>,
    pub add: Vec<NewFact>,
    pub remove: Vec<RemovedFact>,
}

/// Facts are interchangeable when value, note, slot, and rank all match.
type FactShape = (String, String, String, i64);

fn existing_shape(fact: &ExistingFact) -> FactShape {
    (
        fact.snapshot.value_expression.to_string(),
        fact.snapshot.note.clone(),
        fact.snapshot.slot.clone(),
        fact.snapshot.rank,
    )
}

fn desired_shape(fact: &DesiredFact) -> FactShape {
    (
        ValueExpression::entry(fact.target).to_string(),
        fact.note.clone(),
        fact.slot.clone(),
        fact.rank,
    )
}

impl RelationshipDiff {
    pub fn compute(pairs: &[PairState]) -> Self {
        let mut diff = Self::default();

        for pair in pairs {
            let mut unmatched: Vec<&ExistingFact> = pair.current.iter().collect();

            for desired in &pair.desired {
                let shape = desired_shape(desired);
                match unmatched.iter().position(|f| existing_shape(f) == shape) {
                    Some(pos) => diff.keep.push(unmatched.swap_remove(pos).fact_id),
                    None => diff.add.push(NewFact {
                        fact_id: PropertyFactId::new(),
                        entry_id: pair.entry_id,
                        property_id: pair.property_id,
                        property_key: pair.property_key.clone(),
                        rel_type: pair.rel_type,
                        target: desired.target,
                        note: desired.note.clone(),
                        slot: desired.slot.clone(),
                        rank: desired.rank,
                    }),
                }
            }

            diff.remove.extend(unmatched.into_iter().map(|f| RemovedFact {
                entry_id: pair.entry_id,
                fact_id: f.fact_id,
                snapshot: f.snapshot.clone(),
            }));
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Single-edit equivalents: deletions first, then additions.
    pub fn audit_edits(&self) -> Vec<Edit> {
        let deletes = self.remove.iter().map(|r| {
            Edit::DeletePropertyFact(DeletePropertyFact {
                entry_id: r.entry_id,
                property_fact_id: r.fact_id,
            })
        });
        let adds = self.add.iter().map(|a| {
            Edit::AddPropertyFact(AddPropertyFact {
                entry_id: a.entry_id,
                property_key: a.property_key.clone(),
                property_fact_id: a.fact_id,
                value_expression: ValueExpression::entry(a.target),
                note: a.note.clone(),
                slot: a.slot.clone(),
                rank: Some(a.rank),
                weight: None,
            })
        });
        deletes.chain(adds).collect()
    }

    pub fn outcome(&self) -> EditOutcome {
        let touched = touched_nodes(
            self.remove
                .iter()
                .map(|r| (r.entry_id, r.fact_id))
                .chain(self.add.iter().map(|a| (a.entry_id, a.fact_id))),
        );
        let old_values = (!self.remove.is_empty()).then(|| OldValues::Many {
            values: self
                .remove
                .iter()
                .map(|r| OldValues::PropertyFact(r.snapshot.clone()))
                .collect(),
        });
        EditOutcome {
            modified_nodes: touched,
            old_values,
            applied_edits: self.audit_edits(),
        }
    }
}

// ── Store access ─────────────────────────────────────────────────

#[derive(Serialize)]
struct LocatorRequest<'a> {
    idx: usize,
    entry_id: Option<String>,
    entry_key: Option<&'a str>,
}

impl<'a> LocatorRequest<'a> {
    fn new(idx: usize, locator: &'a EntryLocator) -> Self {
        let (entry_id, entry_key) = match locator {
            EntryLocator::Id(id) => (Some(id.to_string()), None),
            EntryLocator::Key(key) => (None, Some(key.as_str())),
        };
        Self {
            idx,
            entry_id,
            entry_key,
        }
    }
}

#[derive(Serialize)]
struct PropertyRequest<'a> {
    idx: usize,
    entry_id: String,
    property_key: &'a str,
}

fn describe(locator: &EntryLocator) -> String {
    match locator {
        EntryLocator::Id(id) => id.to_string(),
        EntryLocator::Key(key) => key.clone(),
    }
}

/// Every edited entry must resolve, even one whose edit sets nothing.
fn require_entries(found: Vec<Option<EntryId>>) -> std::result::Result<Vec<EntryId>, InvalidEdit> {
    let expected = found.len();
    let resolved: Vec<EntryId> = found.into_iter().flatten().collect();
    if resolved.len() != expected {
        return Err(InvalidEdit::OutcomeCountMismatch {
            operation: "SetRelationships",
            expected,
            actual: resolved.len(),
        });
    }
    Ok(resolved)
}

/// The property behind one (entry, property key) request, or why it cannot be reconciled.
fn relationship_property(
    check: FactTargetCheck,
    entry_id: &EntryId,
    property_key: &str,
) -> std::result::Result<(PropertyId, DirectRelType), InvalidEdit> {
    let (property_id, property_type) = check.validate(entry_id, property_key)?;
    let rel_type = property_type
        .direct_rel_type()
        .ok_or_else(|| InvalidEdit::NotARelationshipProperty {
            property_key: property_key.to_string(),
        })?;
    Ok((property_id, rel_type))
}

/// Reconcile a batch of desired relationship sets.
pub async fn set_relationships(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edits: &[SetRelationships],
) -> Result<EditOutcome> {
    let mut pairs = resolve_pairs(txn, site_id, edits).await?;
    load_current_facts(txn, &mut pairs).await?;

    let diff = RelationshipDiff::compute(&pairs);
    apply_diff(txn, site_id, &diff).await?;

    tracing::info!(
        %site_id,
        edits = edits.len(),
        kept = diff.keep.len(),
        added = diff.add.len(),
        removed = diff.remove.len(),
        "Reconciled relationships"
    );
    Ok(diff.outcome())
}

async fn resolve_pairs(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edits: &[SetRelationships],
) -> Result<Vec<PairState>> {
    if edits.is_empty() {
        return Ok(Vec::new());
    }
    let locators: Vec<&EntryLocator> = edits.iter().map(|e| &e.entry_with).collect();
    let found = resolve_entries(txn, site_id, &locators).await?;
    let entry_ids = match require_entries(found) {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!(%site_id, edits = edits.len(), "Rejecting relationship batch: unknown entry");
            return Err(err.into());
        }
    };

    // One request per (edit, property); desired targets indexed alongside.
    let mut requests = Vec::new();
    let mut wanted: Vec<(EntryId, &str, Vec<(usize, &str, &str)>)> = Vec::new();
    let mut targets: Vec<&EntryLocator> = Vec::new();
    let mut target_index: HashMap<&EntryLocator, usize> = HashMap::new();

    for (edit, entry_id) in edits.iter().zip(&entry_ids) {
        for set in &edit.set {
            requests.push(PropertyRequest {
                idx: requests.len(),
                entry_id: entry_id.to_string(),
                property_key: set.property_key.as_str(),
            });
            let desired = set
                .to_entries
                .iter()
                .map(|t| {
                    let t_idx = *target_index.entry(&t.entry_with).or_insert_with(|| {
                        targets.push(&t.entry_with);
                        targets.len() - 1
                    });
                    (t_idx, t.note.as_str(), t.slot.as_str())
                })
                .collect();
            wanted.push((*entry_id, set.property_key.as_str(), desired));
        }
    }
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let checks = check_properties(txn, site_id, &requests).await?;
    let target_ids = resolve_targets(txn, site_id, &targets).await?;

    // A later set for the same (entry, property) replaces an earlier one.
    let mut pairs: Vec<PairState> = Vec::new();
    let mut pair_index: HashMap<(EntryId, PropertyId), usize> = HashMap::new();
    for (check, (entry_id, property_key, desired)) in checks.into_iter().zip(wanted) {
        let (property_id, rel_type) = relationship_property(check, &entry_id, property_key)?;
        let desired = desired
            .into_iter()
            .enumerate()
            .map(|(pos, (t_idx, note, slot))| DesiredFact {
                target: target_ids[t_idx],
                note: note.to_string(),
                slot: slot.to_string(),
                rank: pos as i64 + 1,
            })
            .collect();
        let state = PairState {
            entry_id,
            property_id,
            property_key: property_key.to_string(),
            rel_type,
            current: Vec::new(),
            desired,
        };
        match pair_index.get(&(entry_id, property_id)) {
            Some(&existing) => pairs[existing] = state,
            None => {
                pair_index.insert((entry_id, property_id), pairs.len());
                pairs.push(state);
            }
        }
    }
    Ok(pairs)
}

/// Look up entries by id or key; `None` where nothing in the site matches.
async fn resolve_entries(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    locators: &[&EntryLocator],
) -> Result<Vec<Option<EntryId>>> {
    if locators.is_empty() {
        return Ok(Vec::new());
    }
    let requests: Vec<LocatorRequest> = locators
        .iter()
        .enumerate()
        .map(|(idx, locator)| LocatorRequest::new(idx, locator))
        .collect();

    let q = query(
        "UNWIND apoc.convert.fromJsonList($requests) AS req
         MATCH (entry:Entry {site_id: $site_id})
         WHERE CASE WHEN req.entry_id IS NULL THEN entry.key = req.entry_key
                    ELSE entry.id = req.entry_id END
         RETURN req.idx AS idx, entry.id AS entry_id",
    )
    .param("site_id", site_id.to_string())
    .param("requests", to_json(&requests)?);
    let rows = txn.query_rows(q).await?;

    let mut ids: Vec<Option<EntryId>> = vec![None; locators.len()];
    for row in &rows {
        let idx: i64 = field(row, "idx")?;
        if let Some(slot) = ids.get_mut(idx as usize) {
            *slot = Some(id_field(row, "entry_id")?);
        }
    }
    Ok(ids)
}

/// What the store knows about each (entry, property key) request, in request order.
async fn check_properties(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    requests: &[PropertyRequest<'_>],
) -> Result<Vec<FactTargetCheck>> {
    let q = query(
        "UNWIND apoc.convert.fromJsonList($requests) AS req
         MATCH (entry:Entry {id: req.entry_id, site_id: $site_id})-[:IS_OF_TYPE]->(et:EntryType)
         OPTIONAL MATCH (prop:Property {site_id: $site_id, key: req.property_key})
         OPTIONAL MATCH (prop)-[applies:APPLIES_TO_TYPE]->(et)
         RETURN req.idx AS idx, et.key AS entry_type_key, prop.id AS property_id,
                prop.type AS property_type, applies IS NOT NULL AS applicable",
    )
    .param("site_id", site_id.to_string())
    .param("requests", to_json(&requests)?);

    let mut checks = vec![FactTargetCheck::default(); requests.len()];
    for row in txn.query_rows(q).await? {
        let idx: i64 = field(&row, "idx")?;
        let property = match field::<Option<String>>(&row, "property_id")? {
            Some(raw) => Some((parse_id(&raw)?, property_type_field(&row, "property_type")?)),
            None => None,
        };
        if let Some(check) = checks.get_mut(idx as usize) {
            *check = FactTargetCheck {
                entry_found: true,
                entry_type_key: field(&row, "entry_type_key")?,
                property,
                applicable: field(&row, "applicable")?,
            };
        }
    }
    Ok(checks)
}

async fn resolve_targets(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    targets: &[&EntryLocator],
) -> Result<Vec<EntryId>> {
    let found = resolve_entries(txn, site_id, targets).await?;
    found
        .into_iter()
        .zip(targets)
        .map(|(id, locator)| {
            id.ok_or_else(|| {
                InvalidEdit::RelationshipTargetNotFound {
                    target: describe(locator),
                }
                .into()
            })
        })
        .collect()
}

#[derive(Serialize)]
struct PairRequest {
    idx: usize,
    entry_id: String,
    property_id: String,
}

async fn load_current_facts(txn: &mut GraphTxn, pairs: &mut [PairState]) -> Result<()> {
    if pairs.is_empty() {
        return Ok(());
    }
    let requests: Vec<PairRequest> = pairs
        .iter()
        .enumerate()
        .map(|(idx, p)| PairRequest {
            idx,
            entry_id: p.entry_id.to_string(),
            property_id: p.property_id.to_string(),
        })
        .collect();

    let q = query(
        "UNWIND apoc.convert.fromJsonList($pairs) AS pair
         MATCH (entry:Entry {id: pair.entry_id})-[:PROP_FACT]->(pf:PropertyFact)
               -[:FOR_PROP]->(:Property {id: pair.property_id})
         RETURN pair.idx AS idx, pf.id AS fact_id, pf.value_expression AS value_expression,
                coalesce(pf.note, '') AS note, coalesce(pf.slot, '') AS slot,
                coalesce(pf.rank, 0) AS rank, pf.weight AS weight
         ORDER BY idx, rank",
    )
    .param("pairs", to_json(&requests)?);

    for row in txn.query_rows(q).await? {
        let idx: i64 = field(&row, "idx")?;
        let value: String = field(&row, "value_expression")?;
        let fact = ExistingFact {
            fact_id: id_field(&row, "fact_id")?,
            snapshot: PropertyFactSnapshot {
                value_expression: ValueExpression::parse(&value),
                note: field(&row, "note")?,
                rank: field(&row, "rank")?,
                slot: field(&row, "slot")?,
                weight: field(&row, "weight")?,
            },
        };
        if let Some(pair) = pairs.get_mut(idx as usize) {
            pair.current.push(fact);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct FactRow {
    fact_id: String,
    entry_id: String,
    property_id: String,
    value_expression: String,
    note: String,
    slot: String,
    rank: i64,
}

async fn apply_diff(txn: &mut GraphTxn, site_id: &SiteId, diff: &RelationshipDiff) -> Result<()> {
    let removed: Vec<PropertyFactId> = diff.remove.iter().map(|r| r.fact_id).collect();
    delete_facts(txn, &removed).await?;

    if diff.add.is_empty() {
        return Ok(());
    }

    let rows: Vec<FactRow> = diff
        .add
        .iter()
        .map(|a| FactRow {
            fact_id: a.fact_id.to_string(),
            entry_id: a.entry_id.to_string(),
            property_id: a.property_id.to_string(),
            value_expression: ValueExpression::entry(a.target).to_string(),
            note: a.note.clone(),
            slot: a.slot.clone(),
            rank: a.rank,
        })
        .collect();
    let q = query(
        "UNWIND apoc.convert.fromJsonList($facts) AS f
         MATCH (entry:Entry {id: f.entry_id, site_id: $site_id})
         MATCH (prop:Property {id: f.property_id})
         CREATE (entry)-[:PROP_FACT]->(pf:PropertyFact {
             id: f.fact_id, value_expression: f.value_expression,
             note: f.note, slot: f.slot, rank: f.rank
         })-[:FOR_PROP]->(prop)
         RETURN count(pf) AS created",
    )
    .param("site_id", site_id.to_string())
    .param("facts", to_json(&rows)?);
    let created = match txn.query_one(q).await? {
        Some(row) => field::<i64>(&row, "created")? as usize,
        None => 0,
    };
    if created != rows.len() {
        return Err(InvalidEdit::OutcomeCountMismatch {
            operation: "SetRelationships",
            expected: rows.len(),
            actual: created,
        }
        .into());
    }

    for rel_type in [DirectRelType::IsA, DirectRelType::RelatesTo] {
        let edges: Vec<MirrorEdge> = diff
            .add
            .iter()
            .filter(|a| a.rel_type == rel_type)
            .map(|a| MirrorEdge {
                fact_id: a.fact_id,
                from: a.entry_id,
                to: a.target,
            })
            .collect();
        RelationshipFactMirror::new(rel_type)
            .create_batch(txn, site_id, &edges)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::PropertyType;

    fn existing(target: EntryId, rank: i64) -> ExistingFact {
        ExistingFact {
            fact_id: PropertyFactId::new(),
            snapshot: PropertyFactSnapshot {
                value_expression: ValueExpression::entry(target),
                note: String::new(),
                rank,
                slot: String::new(),
                weight: None,
            },
        }
    }

    fn desired(target: EntryId, rank: i64) -> DesiredFact {
        DesiredFact {
            target,
            note: String::new(),
            slot: String::new(),
            rank,
        }
    }

    fn pair(current: Vec<ExistingFact>, desired: Vec<DesiredFact>) -> PairState {
        PairState {
            entry_id: EntryId::new(),
            property_id: PropertyId::new(),
            property_key: "parent".to_string(),
            rel_type: DirectRelType::IsA,
            current,
            desired,
        }
    }

    /// What the store would hold after applying `diff` to `pair`.
    fn converge(pair: &PairState, diff: &RelationshipDiff) -> Vec<ExistingFact> {
        let mut next: Vec<ExistingFact> = pair
            .current
            .iter()
            .filter(|f| diff.keep.contains(&f.fact_id))
            .cloned()
            .collect();
        next.extend(diff.add.iter().map(|a| ExistingFact {
            fact_id: a.fact_id,
            snapshot: PropertyFactSnapshot {
                value_expression: ValueExpression::entry(a.target),
                note: a.note.clone(),
                rank: a.rank,
                slot: a.slot.clone(),
                weight: None,
            },
        }));
        next
    }

    #[test]
    fn test_new_targets_are_added() {
        let (a, b) = (EntryId::new(), EntryId::new());
        let diff = RelationshipDiff::compute(&[pair(vec![], vec![desired(a, 1), desired(b, 2)])]);
        assert_eq!(diff.add.len(), 2);
        assert!(diff.remove.is_empty());
        assert_eq!(diff.add[1].target, b);
        assert_eq!(diff.add[1].rank, 2);
    }

    #[test]
    fn test_matching_facts_are_kept_and_others_removed() {
        let (a, b, c) = (EntryId::new(), EntryId::new(), EntryId::new());
        let keep = existing(a, 1);
        let stale = existing(c, 2);
        let keep_id = keep.fact_id;
        let stale_id = stale.fact_id;

        let diff = RelationshipDiff::compute(&[pair(
            vec![keep, stale],
            vec![desired(a, 1), desired(b, 2)],
        )]);
        assert_eq!(diff.keep, vec![keep_id]);
        assert_eq!(diff.add.len(), 1);
        assert_eq!(diff.add[0].target, b);
        assert_eq!(diff.remove.len(), 1);
        assert_eq!(diff.remove[0].fact_id, stale_id);
    }

    #[test]
    fn test_empty_desired_set_removes_everything() {
        let diff = RelationshipDiff::compute(&[pair(
            vec![existing(EntryId::new(), 1), existing(EntryId::new(), 2)],
            vec![],
        )]);
        assert!(diff.add.is_empty());
        assert_eq!(diff.remove.len(), 2);
    }

    #[test]
    fn test_duplicate_existing_facts_collapse_to_one() {
        let a = EntryId::new();
        let diff = RelationshipDiff::compute(&[pair(
            vec![existing(a, 1), existing(a, 1)],
            vec![desired(a, 1)],
        )]);
        assert_eq!(diff.keep.len(), 1);
        assert_eq!(diff.remove.len(), 1);
        assert!(diff.add.is_empty());
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let (a, b) = (EntryId::new(), EntryId::new());
        let mut state = pair(vec![existing(EntryId::new(), 1)], vec![desired(a, 1), desired(b, 2)]);

        let first = RelationshipDiff::compute(std::slice::from_ref(&state));
        assert!(!first.audit_edits().is_empty());

        state.current = converge(&state, &first);
        let second = RelationshipDiff::compute(std::slice::from_ref(&state));
        assert!(second.is_empty());
        assert!(second.audit_edits().is_empty());
        assert_eq!(second.keep.len(), 2);
    }

    #[test]
    fn test_note_change_replaces_fact() {
        let a = EntryId::new();
        let mut want = desired(a, 1);
        want.note = "per 2024 revision".to_string();
        let diff = RelationshipDiff::compute(&[pair(vec![existing(a, 1)], vec![want])]);
        assert_eq!(diff.add.len(), 1);
        assert_eq!(diff.remove.len(), 1);
    }

    #[test]
    fn test_audit_edits_mirror_single_edits() {
        let a = EntryId::new();
        let old = existing(EntryId::new(), 1);
        let old_id = old.fact_id;
        let diff = RelationshipDiff::compute(&[pair(vec![old], vec![desired(a, 1)])]);
        let edits = diff.audit_edits();
        assert_eq!(edits.len(), 2);
        match &edits[0] {
            Edit::DeletePropertyFact(d) => assert_eq!(d.property_fact_id, old_id),
            other => panic!("expected delete, got {other:?}"),
        }
        match &edits[1] {
            Edit::AddPropertyFact(add) => {
                assert_eq!(add.value_expression.target_entry(), Some(a));
                assert_eq!(add.rank, Some(1));
                assert_eq!(add.property_key, "parent");
            }
            other => panic!("expected add, got {other:?}"),
        }

        let outcome = diff.outcome();
        assert!(matches!(outcome.old_values, Some(OldValues::Many { ref values }) if values.len() == 1));
        assert_eq!(outcome.modified_nodes.len(), 3);
    }

    fn check(property_type: PropertyType, applicable: bool) -> FactTargetCheck {
        FactTargetCheck {
            entry_found: true,
            entry_type_key: "species".to_string(),
            property: Some((PropertyId::new(), property_type)),
            applicable,
        }
    }

    #[test]
    fn test_unresolved_entry_rejects_batch_even_with_empty_set() {
        let err = require_entries(vec![Some(EntryId::new()), None]).unwrap_err();
        assert_eq!(
            err,
            InvalidEdit::OutcomeCountMismatch {
                operation: "SetRelationships",
                expected: 2,
                actual: 1,
            }
        );
        assert_eq!(require_entries(vec![Some(EntryId::new())]).unwrap().len(), 1);
    }

    #[test]
    fn test_value_property_names_the_key() {
        let err = relationship_property(check(PropertyType::Value, true), &EntryId::new(), "habitat")
            .unwrap_err();
        assert_eq!(
            err,
            InvalidEdit::NotARelationshipProperty {
                property_key: "habitat".to_string()
            }
        );
    }

    #[test]
    fn test_property_checks_report_the_specific_reason() {
        let entry = EntryId::new();
        let err = relationship_property(check(PropertyType::RelIsA, false), &entry, "parent").unwrap_err();
        assert!(matches!(err, InvalidEdit::PropertyNotApplicable { ref entry_type_key, .. } if entry_type_key == "species"));

        let missing = FactTargetCheck {
            entry_found: true,
            ..FactTargetCheck::default()
        };
        let err = relationship_property(missing, &entry, "nope").unwrap_err();
        assert!(matches!(err, InvalidEdit::PropertyNotFound { .. }));

        let (_, rel_type) = relationship_property(check(PropertyType::RelOther, true), &entry, "related").unwrap();
        assert_eq!(rel_type, DirectRelType::RelatesTo);
    }
}
