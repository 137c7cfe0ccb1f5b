//! Direct-edge mirror for relationship facts.
//!
//! A relationship fact has exactly one `IS_A` or `RELATES_TO` edge from its
//! owning entry to its target entry, and `direct_rel_neo4j_id` on the fact
//! holds that edge's id. All edge writes for facts go through this module.

use neo4rs::query;
use serde::Serialize;

use trellis_core::{DirectRelType, EntryId, PropertyFactId, SiteId};

use crate::client::{field, to_json, GraphTxn};
use crate::error::{InvalidEdit, Result};

/// One edge to create: fact, owning entry, and target entry.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorEdge {
    pub fact_id: PropertyFactId,
    pub from: EntryId,
    pub to: EntryId,
}

/// Maintains the mirrored edge of relationship facts of one edge type.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipFactMirror {
    rel_type: DirectRelType,
}

impl RelationshipFactMirror {
    pub fn new(rel_type: DirectRelType) -> Self {
        Self { rel_type }
    }

    pub fn rel_type(&self) -> DirectRelType {
        self.rel_type
    }

    /// Create the edge for one fact and record its id on the fact.
    ///
    /// Fails with `RelationshipTargetNotFound` if the target is not an entry in the site.
    pub async fn create(
        &self,
        txn: &mut GraphTxn,
        site_id: &SiteId,
        fact_id: PropertyFactId,
        from: EntryId,
        to: EntryId,
    ) -> Result<()> {
        self.create_batch(txn, site_id, &[MirrorEdge { fact_id, from, to }])
            .await
    }

    /// Create edges for many facts in one statement.
    ///
    /// Every target must exist in the site, otherwise the whole batch is rejected.
    pub async fn create_batch(
        &self,
        txn: &mut GraphTxn,
        site_id: &SiteId,
        edges: &[MirrorEdge],
    ) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }

        let cypher = format!(
            "UNWIND apoc.convert.fromJsonList($edges) AS edge
             MATCH (from:Entry {{id: edge.from, site_id: $site_id}})
                   -[:PROP_FACT]->(pf:PropertyFact {{id: edge.fact_id}})
             MATCH (to:Entry {{id: edge.to, site_id: $site_id}})
             CREATE (from)-[rel:{rel_type}]->(to)
             SET pf.direct_rel_neo4j_id = id(rel)
             RETURN edge.to AS target",
            rel_type = self.rel_type.cypher_type()
        );
        let q = query(&cypher)
            .param("site_id", site_id.to_string())
            .param("edges", to_json(&edges)?);

        let rows = txn.query_rows(q).await?;
        if rows.len() != edges.len() {
            let created: Vec<String> = rows
                .iter()
                .filter_map(|row| field::<String>(row, "target").ok())
                .collect();
            let missing = edges
                .iter()
                .map(|e| e.to.to_string())
                .find(|to| !created.contains(to))
                .unwrap_or_default();
            return Err(InvalidEdit::RelationshipTargetNotFound { target: missing }.into());
        }

        tracing::debug!(
            rel_type = self.rel_type.cypher_type(),
            count = edges.len(),
            "Created mirrored edges"
        );
        Ok(())
    }

    /// Replace a fact's edge wholesale with one pointing at `to`.
    pub async fn replace(
        &self,
        txn: &mut GraphTxn,
        site_id: &SiteId,
        fact_id: PropertyFactId,
        from: EntryId,
        to: EntryId,
    ) -> Result<()> {
        Self::delete(txn, &[fact_id]).await?;
        self.create(txn, site_id, fact_id, from, to).await
    }

    /// Remove the mirrored edges of the given facts, located by their recorded id.
    ///
    /// Facts without an edge are ignored. The facts themselves are not deleted.
    pub async fn delete(txn: &mut GraphTxn, fact_ids: &[PropertyFactId]) -> Result<()> {
        if fact_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = fact_ids.iter().map(ToString::to_string).collect();
        let q = query(
            "UNWIND $fact_ids AS fact_id
             MATCH (from:Entry)-[:PROP_FACT]->(pf:PropertyFact {id: fact_id})
             WHERE pf.direct_rel_neo4j_id IS NOT NULL
             MATCH (from)-[rel]->(:Entry)
             WHERE id(rel) = pf.direct_rel_neo4j_id
             DELETE rel
             REMOVE pf.direct_rel_neo4j_id",
        )
        .param("fact_ids", ids);

        txn.run(q).await?;
        Ok(())
    }
}
