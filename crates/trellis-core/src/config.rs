//! Configuration management for Trellis services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`TRELLIS__` prefix, `__` separator)
//! 2. Config file (`trellis.toml`)
//! 3. Defaults

use serde::Deserialize;

use crate::error::TrellisError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub neo4j: Neo4jConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Connection settings for the Neo4j entity store.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Tuning for the property and relationship engine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum IS_A hops followed when resolving ancestors.
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: u32,

    /// Page size for property listings when the caller gives none.
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,

    /// Properties ranked above this are hidden from default listings.
    #[serde(default = "default_max_importance")]
    pub default_max_importance: i64,

    /// Items fetched per relationship group when the caller gives no limit.
    #[serde(default = "default_relationship_page_limit")]
    pub relationship_page_limit: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "trellis-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_max_ancestor_depth() -> u32 {
    50
}

fn default_page_limit() -> usize {
    50
}

fn default_max_importance() -> i64 {
    20
}

fn default_relationship_page_limit() -> usize {
    10
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: default_max_ancestor_depth(),
            default_page_limit: default_page_limit(),
            default_max_importance: default_max_importance(),
            relationship_page_limit: default_relationship_page_limit(),
        }
    }
}

impl TrellisConfig {
    /// Load from `<file_prefix>.toml` (optional) layered under `TRELLIS__*` env vars.
    pub fn load(file_prefix: &str) -> Result<Self, TrellisError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TRELLIS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = cfg.try_deserialize()?;
        tracing::debug!(uri = %loaded.neo4j.uri, "Loaded configuration");
        Ok(loaded)
    }
}
