//! Edit dispatch and the transaction driver.
//!
//! A call to [`EditEngine::apply_edits`] or [`EditEngine::apply_bulk`] is one
//! transaction: every edit commits together or none does.

use neo4rs::query;

use trellis_core::edits::{BulkOutcome, SetRelationships, UpsertEntryByKey};
use trellis_core::{BulkEdit, ConnectionId, Edit, EditOutcome, EditResult, SiteId};

use crate::bulk::{self, merge_outcome};
use crate::client::{GraphClient, GraphTxn};
use crate::error::{InvalidEdit, Result};
use crate::{entries, facts};

/// Applies structured edits to one site's graph.
#[derive(Clone)]
pub struct EditEngine {
    client: GraphClient,
}

impl EditEngine {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Apply edits in order. One result per edit, or nothing at all on failure.
    pub async fn apply_edits(&self, site_id: &SiteId, edits: &[Edit]) -> Result<Vec<EditResult>> {
        let mut txn = self.client.start_txn().await?;

        let mut results = Vec::with_capacity(edits.len());
        for (index, edit) in edits.iter().enumerate() {
            match apply_edit(&mut txn, site_id, edit).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::warn!(
                        %site_id,
                        index,
                        code = edit.code(),
                        error = %err,
                        "Edit rejected, rolling back"
                    );
                    rollback(txn).await;
                    return Err(err);
                }
            }
        }

        txn.commit().await?;
        let applied = results.iter().filter(|r| r.had_effect()).count();
        tracing::info!(%site_id, edits = edits.len(), applied, "Committed edits");
        Ok(results)
    }

    /// Reconcile a batch of bulk edits submitted by `connection_id`.
    pub async fn apply_bulk(
        &self,
        site_id: &SiteId,
        connection_id: &ConnectionId,
        edits: &[BulkEdit],
    ) -> Result<BulkOutcome> {
        let mut txn = self.client.start_txn().await?;

        match run_bulk(&mut txn, site_id, connection_id, edits).await {
            Ok(outcome) => {
                txn.commit().await?;
                tracing::info!(
                    %site_id,
                    %connection_id,
                    edits = edits.len(),
                    applied = outcome.applied_edits.len(),
                    "Committed bulk edits"
                );
                Ok(BulkOutcome {
                    connection_id: *connection_id,
                    outcome,
                })
            }
            Err(err) => {
                tracing::warn!(
                    %site_id,
                    %connection_id,
                    edits = edits.len(),
                    error = %err,
                    "Bulk batch rejected, rolling back"
                );
                rollback(txn).await;
                Err(err)
            }
        }
    }
}

/// Dispatch one edit to its applier on an open transaction.
pub async fn apply_edit(txn: &mut GraphTxn, site_id: &SiteId, edit: &Edit) -> Result<EditResult> {
    let result = match edit {
        Edit::CreateEntry(e) => entries::create_entry(txn, site_id, e).await?,
        Edit::SetEntryName(e) => entries::set_entry_name(txn, site_id, e).await?,
        Edit::SetEntryDescription(e) => entries::set_entry_description(txn, site_id, e).await?,
        Edit::AddPropertyFact(e) => facts::add_property_fact(txn, site_id, e).await?,
        Edit::UpdatePropertyFact(e) => facts::update_property_fact(txn, site_id, e).await?,
        Edit::DeletePropertyFact(e) => facts::delete_property_fact(txn, site_id, e).await?,
    };
    tracing::debug!(
        code = edit.code(),
        entry_id = %edit.entry_id(),
        had_effect = result.had_effect(),
        "Applied edit"
    );
    Ok(result)
}

async fn rollback(txn: GraphTxn) {
    if let Err(err) = txn.rollback().await {
        tracing::warn!(error = %err, "Rollback failed");
    }
}

/// Consecutive bulk edits of the same kind, reconciled together.
#[derive(Debug, PartialEq)]
enum BulkRun {
    Relationships(Vec<SetRelationships>),
    Upserts(Vec<UpsertEntryByKey>),
}

fn group_runs(edits: &[BulkEdit]) -> Vec<BulkRun> {
    let mut runs: Vec<BulkRun> = Vec::new();
    for edit in edits {
        match (edit, runs.last_mut()) {
            (BulkEdit::SetRelationships(e), Some(BulkRun::Relationships(run))) => run.push(e.clone()),
            (BulkEdit::UpsertEntryByKey(e), Some(BulkRun::Upserts(run))) => run.push(e.clone()),
            (BulkEdit::SetRelationships(e), _) => runs.push(BulkRun::Relationships(vec![e.clone()])),
            (BulkEdit::UpsertEntryByKey(e), _) => runs.push(BulkRun::Upserts(vec![e.clone()])),
        }
    }
    runs
}

async fn run_bulk(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    connection_id: &ConnectionId,
    edits: &[BulkEdit],
) -> Result<EditOutcome> {
    ensure_connection(txn, site_id, connection_id).await?;

    let mut total = EditOutcome::default();
    for run in group_runs(edits) {
        let outcome = match &run {
            BulkRun::Relationships(batch) => bulk::set_relationships(txn, site_id, batch).await?,
            BulkRun::Upserts(batch) => bulk::upsert_entries(txn, site_id, batch).await?,
        };
        merge_outcome(&mut total, outcome);
    }
    Ok(total)
}

async fn ensure_connection(
    txn: &mut GraphTxn,
    site_id: &SiteId,
    connection_id: &ConnectionId,
) -> Result<()> {
    let q = query(
        "MATCH (c:Connection {id: $connection_id, site_id: $site_id})
         RETURN c.id AS id",
    )
    .param("site_id", site_id.to_string())
    .param("connection_id", connection_id.to_string());

    match txn.query_one(q).await? {
        Some(_) => Ok(()),
        None => Err(InvalidEdit::ConnectionNotFound {
            connection_id: connection_id.to_string(),
        }
        .into()),
    }
}
