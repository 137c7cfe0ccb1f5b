//! The structured edit vocabulary.
//!
//! Edits arrive from draft acceptance or a bulk-sync connection already
//! ordered. Single edits change one entry; bulk edits carry a desired end
//! state for many entries and are reconciled into equivalent single edits for
//! the audit trail.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrellisError;
use crate::types::{ConnectionId, EntryId, PropertyFactId};
use crate::value::ValueExpression;

// ── Single edits ──────────────────────────────────────────────────

/// One atomic change to one entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", content = "data")]
pub enum Edit {
    CreateEntry(CreateEntry),
    SetEntryName(SetEntryName),
    SetEntryDescription(SetEntryDescription),
    AddPropertyFact(AddPropertyFact),
    UpdatePropertyFact(UpdatePropertyFact),
    DeletePropertyFact(DeletePropertyFact),
}

impl Edit {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CreateEntry(_) => "CreateEntry",
            Self::SetEntryName(_) => "SetEntryName",
            Self::SetEntryDescription(_) => "SetEntryDescription",
            Self::AddPropertyFact(_) => "AddPropertyFact",
            Self::UpdatePropertyFact(_) => "UpdatePropertyFact",
            Self::DeletePropertyFact(_) => "DeletePropertyFact",
        }
    }

    /// The entry this edit targets.
    pub fn entry_id(&self) -> EntryId {
        match self {
            Self::CreateEntry(e) => e.entry_id,
            Self::SetEntryName(e) => e.entry_id,
            Self::SetEntryDescription(e) => e.entry_id,
            Self::AddPropertyFact(e) => e.entry_id,
            Self::UpdatePropertyFact(e) => e.entry_id,
            Self::DeletePropertyFact(e) => e.entry_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateEntry {
    pub entry_id: EntryId,
    pub entry_type_key: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetEntryName {
    pub entry_id: EntryId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetEntryDescription {
    pub entry_id: EntryId,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddPropertyFact {
    pub entry_id: EntryId,
    pub property_key: String,
    pub property_fact_id: PropertyFactId,
    pub value_expression: ValueExpression,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub slot: String,
    /// Assigned as the current maximum plus one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Only the supplied fields are changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatePropertyFact {
    pub property_fact_id: PropertyFactId,
    pub entry_id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_expression: Option<ValueExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl UpdatePropertyFact {
    pub fn is_empty(&self) -> bool {
        self.value_expression.is_none()
            && self.note.is_none()
            && self.rank.is_none()
            && self.slot.is_none()
            && self.weight.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletePropertyFact {
    pub entry_id: EntryId,
    pub property_fact_id: PropertyFactId,
}

// ── Bulk edits ────────────────────────────────────────────────────

/// Identifies an entry either by id or by its site-unique friendly key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryLocator {
    Id(EntryId),
    Key(String),
}

/// A desired end state for many entries, reconciled in one transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", content = "data")]
pub enum BulkEdit {
    SetRelationships(SetRelationships),
    UpsertEntryByKey(UpsertEntryByKey),
}

impl BulkEdit {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SetRelationships(_) => "SetRelationships",
            Self::UpsertEntryByKey(_) => "UpsertEntryByKey",
        }
    }
}

/// The complete desired set of targets per relationship property on one entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetRelationships {
    pub entry_with: EntryLocator,
    pub set: Vec<RelationshipSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipSet {
    pub property_key: String,
    /// Rank of each resulting fact is its position in this list, starting at 1.
    pub to_entries: Vec<RelationshipTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipTarget {
    pub entry_with: EntryLocator,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub slot: String,
}

/// Match-or-create an entry by key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpsertEntryByKey {
    #[serde(rename = "where")]
    pub where_: EntryKeyMatch,
    /// Applied whenever present and different from the current value.
    #[serde(default)]
    pub set: EntryFields,
    /// Applied only when the entry does not exist yet.
    #[serde(default)]
    pub set_on_create: EntryFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryKeyMatch {
    pub entry_type_key: String,
    pub entry_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Outcomes ──────────────────────────────────────────────────────

/// Prior field values of a property fact, enough to build an inverse edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyFactSnapshot {
    pub value_expression: ValueExpression,
    pub note: String,
    pub rank: i64,
    pub slot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OldValues {
    PropertyFact(PropertyFactSnapshot),
    EntryName { name: String },
    EntryDescription { description: String },
    /// Bulk reconcilers report every value they overwrote or removed.
    Many { values: Vec<OldValues> },
}

/// What an applied edit changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EditOutcome {
    pub modified_nodes: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<OldValues>,
    /// Single-edit equivalents of what was applied, for audit and undo.
    pub applied_edits: Vec<Edit>,
}

/// Result of one edit. `HadNoEffect` is not an error: replayed edits land here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditResult {
    Applied(EditOutcome),
    HadNoEffect,
}

impl EditResult {
    pub fn had_effect(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Outcome of a bulk call, attributed to the connection that submitted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkOutcome {
    pub connection_id: ConnectionId,
    #[serde(flatten)]
    pub outcome: EditOutcome,
}

/// Parse a JSON array of single edits.
pub fn parse_edits(json: &str) -> Result<Vec<Edit>, TrellisError> {
    Ok(serde_json::from_str(json)?)
}

/// Parse a JSON array of bulk edits.
pub fn parse_bulk_edits(json: &str) -> Result<Vec<BulkEdit>, TrellisError> {
    Ok(serde_json::from_str(json)?)
}
