//! Match-or-create entries by friendly key.

use std::collections::HashMap;

use neo4rs::query;
use serde::Serialize;

use trellis_core::edits::{
    CreateEntry, EntryFields, OldValues, SetEntryDescription, SetEntryName, UpsertEntryByKey,
};
use trellis_core::{Edit, EditOutcome, EntryId, SiteId};

use crate::client::{field, parse_id, to_json, GraphTxn};
use crate::error::{map_conflict, InvalidEdit, Result};

/// What the store holds for one upsert's key.
#[derive(Debug, Clone, Default)]
pub struct KeyLookup {
    pub entry_type_found: bool,
    pub existing: Option<ExistingEntry>,
}

#[derive(Debug, Clone)]
pub struct ExistingEntry {
    pub entry_id: EntryId,
    pub entry_type_key: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryChange {
    Create(CreateEntry),
    Update {
        entry_id: EntryId,
        /// `(old, new)` when the name changes.
        name: Option<(String, String)>,
        description: Option<(String, String)>,
    },
}

/// Creates and updates for a batch, planned in submission order.
#[derive(Debug, Clone, Default)]
pub struct UpsertPlan {
    pub changes: Vec<EntryChange>,
}

impl UpsertPlan {
    /// Plan `edits` against `lookups` (one per edit, same order).
    ///
    /// A key repeated within the batch sees the state planned by its earlier
    /// occurrence rather than the stored one.
    pub fn compute(
        edits: &[UpsertEntryByKey],
        lookups: &[KeyLookup],
        mut new_id: impl FnMut() -> EntryId,
    ) -> std::result::Result<Self, InvalidEdit> {
        let mut planned: HashMap<&str, ExistingEntry> = HashMap::new();
        let mut changes = Vec::new();

        for (edit, lookup) in edits.iter().zip(lookups) {
            let wanted = &edit.where_;
            let current = planned
                .get(wanted.entry_key.as_str())
                .cloned()
                .or_else(|| lookup.existing.clone());

            let Some(current) = current else {
                if !lookup.entry_type_found {
                    return Err(InvalidEdit::EntryTypeNotFound {
                        entry_type_key: wanted.entry_type_key.clone(),
                    });
                }
                let create = CreateEntry {
                    entry_id: new_id(),
                    entry_type_key: wanted.entry_type_key.clone(),
                    key: wanted.entry_key.clone(),
                    name: creation_value(&edit.set, &edit.set_on_create, |f| &f.name),
                    description: creation_value(&edit.set, &edit.set_on_create, |f| &f.description),
                };
                planned.insert(
                    wanted.entry_key.as_str(),
                    ExistingEntry {
                        entry_id: create.entry_id,
                        entry_type_key: create.entry_type_key.clone(),
                        name: create.name.clone(),
                        description: create.description.clone(),
                    },
                );
                changes.push(EntryChange::Create(create));
                continue;
            };

            if current.entry_type_key != wanted.entry_type_key {
                return Err(InvalidEdit::IdConflict {
                    detail: format!(
                        "key {:?} belongs to an entry of type {:?}, not {:?}",
                        wanted.entry_key, current.entry_type_key, wanted.entry_type_key
                    ),
                });
            }

            let name = changed(&current.name, edit.set.name.as_deref());
            let description = changed(&current.description, edit.set.description.as_deref());
            let mut next = current.clone();
            if let Some((_, new)) = &name {
                next.name = new.clone();
            }
            if let Some((_, new)) = &description {
                next.description = new.clone();
            }
            planned.insert(wanted.entry_key.as_str(), next);

            if name.is_some() || description.is_some() {
                changes.push(EntryChange::Update {
                    entry_id: current.entry_id,
                    name,
                    description,
                });
            }
        }

        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn outcome(&self) -> EditOutcome {
        let mut outcome = EditOutcome::default();
        let mut old = Vec::new();

        for change in &self.changes {
            match change {
                EntryChange::Create(create) => {
                    push_unique(&mut outcome.modified_nodes, create.entry_id);
                    outcome.applied_edits.push(Edit::CreateEntry(create.clone()));
                }
                EntryChange::Update {
                    entry_id,
                    name,
                    description,
                } => {
                    push_unique(&mut outcome.modified_nodes, *entry_id);
                    if let Some((was, now)) = name {
                        old.push(OldValues::EntryName { name: was.clone() });
                        outcome.applied_edits.push(Edit::SetEntryName(SetEntryName {
                            entry_id: *entry_id,
                            name: now.clone(),
                        }));
                    }
                    if let Some((was, now)) = description {
                        old.push(OldValues::EntryDescription {
                            description: was.clone(),
                        });
                        outcome
                            .applied_edits
                            .push(Edit::SetEntryDescription(SetEntryDescription {
                                entry_id: *entry_id,
                                description: now.clone(),
                            }));
                    }
                }
            }
        }

        if !old.is_empty() {
            outcome.old_values = Some(OldValues::Many { values: old });
        }
        outcome
    }
}

fn creation_value(
    set: &EntryFields,
    set_on_create: &EntryFields,
    pick: impl Fn(&EntryFields) -> &Option<String>,
) -> String {
    pick(set)
        .as_ref()
        .or(pick(set_on_create).as_ref())
        .cloned()
        .unwrap_or_default()
}

fn changed(current: &str, wanted: Option<&str>) -> Option<(String, String)> {
    wanted
        .filter(|w| *w != current)
        .map(|w| (current.to_string(), w.to_string()))
}

fn push_unique(nodes: &mut Vec<uuid::Uuid>, id: EntryId) {
    if !nodes.contains(&id.0) {
        nodes.push(id.0);
    }
}

// ── Store access ─────────────────────────────────────────────────

#[derive(Serialize)]
struct LookupRequest<'a> {
    idx: usize,
    entry_type_key: &'a str,
    entry_key: &'a str,
}

#[derive(Serialize)]
struct UpdateRow {
    entry_id: String,
    name: Option<String>,
    description: Option<String>,
}

/// Upsert a batch of entries by key.
pub async fn upsert_entries(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edits: &[UpsertEntryByKey],
) -> Result<EditOutcome> {
    let lookups = lookup_keys(txn, site_id, edits).await?;
    let plan = UpsertPlan::compute(edits, &lookups, EntryId::new)?;
    apply_plan(txn, site_id, &plan).await?;

    tracing::info!(
        %site_id,
        edits = edits.len(),
        changes = plan.changes.len(),
        "Upserted entries by key"
    );
    Ok(plan.outcome())
}

async fn lookup_keys(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edits: &[UpsertEntryByKey],
) -> Result<Vec<KeyLookup>> {
    if edits.is_empty() {
        return Ok(Vec::new());
    }
    let requests: Vec<LookupRequest> = edits
        .iter()
        .enumerate()
        .map(|(idx, e)| LookupRequest {
            idx,
            entry_type_key: &e.where_.entry_type_key,
            entry_key: &e.where_.entry_key,
        })
        .collect();

    let q = query(
        "UNWIND apoc.convert.fromJsonList($requests) AS req
         OPTIONAL MATCH (et:EntryType {site_id: $site_id, key: req.entry_type_key})
         OPTIONAL MATCH (entry:Entry {site_id: $site_id, key: req.entry_key})
                        -[:IS_OF_TYPE]->(current_type:EntryType)
         RETURN req.idx AS idx, et IS NOT NULL AS entry_type_found,
                entry.id AS entry_id, current_type.key AS entry_type_key,
                coalesce(entry.name, '') AS name,
                coalesce(entry.description, '') AS description",
    )
    .param("site_id", site_id.to_string())
    .param("requests", to_json(&requests)?);
    let rows = txn.query_rows(q).await?;
    if rows.len() != edits.len() {
        return Err(InvalidEdit::OutcomeCountMismatch {
            operation: "UpsertEntryByKey",
            expected: edits.len(),
            actual: rows.len(),
        }
        .into());
    }

    let mut lookups = vec![KeyLookup::default(); edits.len()];
    for row in &rows {
        let idx: i64 = field(row, "idx")?;
        let Some(lookup) = lookups.get_mut(idx as usize) else {
            continue;
        };
        lookup.entry_type_found = field(row, "entry_type_found")?;
        let entry_id: Option<String> = field(row, "entry_id")?;
        if let Some(raw) = entry_id {
            lookup.existing = Some(ExistingEntry {
                entry_id: parse_id(&raw)?,
                entry_type_key: field::<Option<String>>(row, "entry_type_key")?.unwrap_or_default(),
                name: field(row, "name")?,
                description: field(row, "description")?,
            });
        }
    }
    Ok(lookups)
}

async fn apply_plan(txn: &mut GraphTxn, site_id: &SiteId, plan: &UpsertPlan) -> Result<()> {
    let mut creates = Vec::new();
    let mut updates = Vec::new();
    for change in &plan.changes {
        match change {
            EntryChange::Create(create) => creates.push(create),
            EntryChange::Update {
                entry_id,
                name,
                description,
            } => updates.push(UpdateRow {
                entry_id: entry_id.to_string(),
                name: name.as_ref().map(|(_, new)| new.clone()),
                description: description.as_ref().map(|(_, new)| new.clone()),
            }),
        }
    }

    if !creates.is_empty() {
        let q = query(
            "UNWIND apoc.convert.fromJsonList($creates) AS c
             MATCH (et:EntryType {site_id: $site_id, key: c.entry_type_key})
             CREATE (e:Entry {
                 id: c.entry_id, site_id: $site_id, key: c.key,
                 name: c.name, description: c.description
             })-[:IS_OF_TYPE]->(et)
             RETURN count(e) AS created",
        )
        .param("site_id", site_id.to_string())
        .param("creates", to_json(&creates)?);
        let created = match txn
            .query_one(q)
            .await
            .map_err(|e| map_conflict(e, "entry key created concurrently"))?
        {
            Some(row) => field::<i64>(&row, "created")? as usize,
            None => 0,
        };
        ensure_count("UpsertEntryByKey create", creates.len(), created)?;
    }

    // Updates run in plan order, so the last write to a key wins.
    if !updates.is_empty() {
        let q = query(
            "UNWIND apoc.convert.fromJsonList($updates) AS u
             MATCH (e:Entry {id: u.entry_id, site_id: $site_id})
             SET e.name = coalesce(u.name, e.name),
                 e.description = coalesce(u.description, e.description)
             RETURN count(e) AS updated",
        )
        .param("site_id", site_id.to_string())
        .param("updates", to_json(&updates)?);
        let updated = match txn.query_one(q).await? {
            Some(row) => field::<i64>(&row, "updated")? as usize,
            None => 0,
        };
        ensure_count("UpsertEntryByKey update", updates.len(), updated)?;
    }
    Ok(())
}

fn ensure_count(operation: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(InvalidEdit::OutcomeCountMismatch {
            operation,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}
