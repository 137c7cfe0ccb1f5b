//! Constraint and index bootstrap.

use neo4rs::query;

use crate::client::{GraphClient, GraphError};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT site_id IF NOT EXISTS FOR (n:Site) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT entry_type_id IF NOT EXISTS FOR (n:EntryType) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT entry_id IF NOT EXISTS FOR (n:Entry) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT entry_site_key IF NOT EXISTS FOR (n:Entry) REQUIRE (n.site_id, n.key) IS UNIQUE",
    "CREATE CONSTRAINT property_id IF NOT EXISTS FOR (n:Property) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT property_fact_id IF NOT EXISTS FOR (n:PropertyFact) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT connection_id IF NOT EXISTS FOR (n:Connection) REQUIRE n.id IS UNIQUE",
    "CREATE INDEX property_site_key IF NOT EXISTS FOR (n:Property) ON (n.site_id, n.key)",
    "CREATE INDEX entry_type_site_key IF NOT EXISTS FOR (n:EntryType) ON (n.site_id, n.key)",
];

impl GraphClient {
    /// Create uniqueness constraints and lookup indexes. Safe to run repeatedly.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for statement in SCHEMA_STATEMENTS {
            self.run(query(statement)).await?;
        }
        tracing::info!(statements = SCHEMA_STATEMENTS.len(), "Graph schema ensured");
        Ok(())
    }
}
