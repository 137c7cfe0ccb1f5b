//! trellis-core: Shared types, edit vocabulary, and configuration for Trellis.
//!
//! This crate provides the foundational types used across all Trellis components:
//! - Identifier newtypes for sites, entries, entry types, properties, and facts
//! - Property schema enums and the `ValueExpression` sum type
//! - The structured edit vocabulary consumed by the graph engine
//! - Configuration management
//! - The top-level error type

pub mod config;
pub mod edits;
pub mod error;
pub mod types;
pub mod value;

pub use config::{EngineConfig, Neo4jConfig, TrellisConfig};
pub use edits::{BulkEdit, Edit, EditOutcome, EditResult};
pub use error::TrellisError;
pub use types::{
    ConnectionId, DirectRelType, EntryId, EntrySummary, EntryTypeId, PropertyFactId, PropertyId,
    PropertyMode, PropertyType, SiteId,
};
pub use value::ValueExpression;
