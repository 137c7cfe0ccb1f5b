//! Neo4j connection management, shared graph client, and transaction handle.

use std::str::FromStr;

use neo4rs::{ConfigBuilder, Graph, Query, Row};
use trellis_core::Neo4jConfig;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {label} with id {id} in site {site_id}")]
    NotFound {
        label: String,
        id: String,
        site_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Neo4jConfig::default())
    }
}

impl From<&Neo4jConfig> for GraphConfig {
    fn from(cfg: &Neo4jConfig) -> Self {
        Self {
            uri: cfg.uri.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            max_connections: cfg.max_connections,
            fetch_size: cfg.fetch_size,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Read paths run directly on the client; every edit runs on a [`GraphTxn`].
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<GraphTxn, GraphError> {
        Ok(GraphTxn {
            txn: self.graph.start_txn().await?,
        })
    }
}

/// An open transaction. Nothing is visible to other readers until [`commit`](Self::commit).
pub struct GraphTxn {
    txn: neo4rs::Txn,
}

impl GraphTxn {
    pub async fn run(&mut self, query: Query) -> Result<(), GraphError> {
        self.txn.run(query).await?;
        Ok(())
    }

    pub async fn query_rows(&mut self, query: Query) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.txn.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn query_one(&mut self, query: Query) -> Result<Option<Row>, GraphError> {
        Ok(self.query_rows(query).await?.into_iter().next())
    }

    pub async fn commit(self) -> Result<(), GraphError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), GraphError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

// ── Row helpers ──────────────────────────────────────────────────

/// Read a column, mapping deserialization failures to [`GraphError::Serialization`].
pub(crate) fn field<'r, T: serde::Deserialize<'r>>(row: &'r Row, key: &str) -> Result<T, GraphError> {
    row.get::<T>(key)
        .map_err(|e| GraphError::Serialization(format!("Failed to read column {key}: {e}")))
}

/// Parse a stored id string into its typed newtype.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, GraphError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| GraphError::Serialization(format!("Invalid id {raw:?}: {e}")))
}

/// Read a column holding a stored id.
pub(crate) fn id_field<T>(row: &Row, key: &str) -> Result<T, GraphError>
where
    T: FromStr<Err = uuid::Error>,
{
    let raw: String = field(row, key)?;
    parse_id(&raw)
}

/// Serialize a batch for `apoc.convert.fromJsonList`.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, GraphError> {
    serde_json::to_string(value).map_err(|e| GraphError::Serialization(e.to_string()))
}
