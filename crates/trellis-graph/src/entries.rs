//! Entry-level edits: create, rename, describe.

use neo4rs::query;

use trellis_core::edits::{CreateEntry, OldValues, SetEntryDescription, SetEntryName};
use trellis_core::{Edit, EditOutcome, EditResult, EntryId, SiteId};

use crate::client::{field, GraphTxn};
use crate::error::{map_conflict, InvalidEdit, Result};

/// Create a new entry of an existing type. Ids and keys must be unused.
pub async fn create_entry(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edit: &CreateEntry,
) -> Result<EditResult> {
    let q = query(
        "MATCH (et:EntryType {key: $entry_type_key, site_id: $site_id})
         CREATE (e:Entry {
             id: $entry_id, site_id: $site_id, key: $key,
             name: $name, description: $description
         })-[:IS_OF_TYPE]->(et)
         RETURN e.id AS id",
    )
    .param("site_id", site_id.to_string())
    .param("entry_type_key", edit.entry_type_key.clone())
    .param("entry_id", edit.entry_id.to_string())
    .param("key", edit.key.clone())
    .param("name", edit.name.clone())
    .param("description", edit.description.clone());

    let created = txn
        .query_one(q)
        .await
        .map_err(|e| map_conflict(e, format!("entry {} with key {:?}", edit.entry_id, edit.key)))?;
    if created.is_none() {
        return Err(InvalidEdit::EntryTypeNotFound {
            entry_type_key: edit.entry_type_key.clone(),
        }
        .into());
    }

    tracing::debug!(entry_id = %edit.entry_id, key = %edit.key, "Created entry");
    Ok(EditResult::Applied(EditOutcome {
        modified_nodes: vec![edit.entry_id.0],
        old_values: None,
        applied_edits: vec![Edit::CreateEntry(edit.clone())],
    }))
}

pub async fn set_entry_name(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edit: &SetEntryName,
) -> Result<EditResult> {
    let old = set_entry_field(txn, site_id, &edit.entry_id, EntryField::Name, &edit.name).await?;
    Ok(old.map_or(EditResult::HadNoEffect, |name| {
        EditResult::Applied(EditOutcome {
            modified_nodes: vec![edit.entry_id.0],
            old_values: Some(OldValues::EntryName { name }),
            applied_edits: vec![Edit::SetEntryName(edit.clone())],
        })
    }))
}

pub async fn set_entry_description(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    edit: &SetEntryDescription,
) -> Result<EditResult> {
    let old = set_entry_field(
        txn,
        site_id,
        &edit.entry_id,
        EntryField::Description,
        &edit.description,
    )
    .await?;
    Ok(old.map_or(EditResult::HadNoEffect, |description| {
        EditResult::Applied(EditOutcome {
            modified_nodes: vec![edit.entry_id.0],
            old_values: Some(OldValues::EntryDescription { description }),
            applied_edits: vec![Edit::SetEntryDescription(edit.clone())],
        })
    }))
}

#[derive(Debug, Clone, Copy)]
enum EntryField {
    Name,
    Description,
}

impl EntryField {
    fn property(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
        }
    }
}

/// Set one field, returning the previous value, or `None` if it was already equal.
async fn set_entry_field(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    entry_id: &EntryId,
    which: EntryField,
    value: &str,
) -> Result<Option<String>> {
    let prop = which.property();
    let read = query(&format!(
        "MATCH (e:Entry {{id: $entry_id, site_id: $site_id}})
         RETURN coalesce(e.{prop}, '') AS old"
    ))
    .param("site_id", site_id.to_string())
    .param("entry_id", entry_id.to_string());

    let row = txn
        .query_one(read)
        .await?
        .ok_or_else(|| InvalidEdit::EntryNotFound {
            entry_id: entry_id.to_string(),
        })?;
    let old: String = field(&row, "old")?;
    if old == value {
        return Ok(None);
    }

    let write = query(&format!(
        "MATCH (e:Entry {{id: $entry_id, site_id: $site_id}})
         SET e.{prop} = $value"
    ))
    .param("site_id", site_id.to_string())
    .param("entry_id", entry_id.to_string())
    .param("value", value.to_string());
    txn.run(write).await?;

    tracing::debug!(%entry_id, field = prop, "Updated entry");
    Ok(Some(old))
}
