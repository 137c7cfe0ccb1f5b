//! Trellis Graph — the property and relationship engine over Neo4j.
//!
//! This crate is the single mutation point for entries and their property
//! facts. Relationship-typed facts are mirrored as direct `IS_A` /
//! `RELATES_TO` edges between entries, and every write path keeps the fact
//! and its edge consistent inside one transaction.

pub mod ancestors;
pub mod bulk;
pub mod client;
pub mod edit;
pub mod entries;
pub mod error;
pub mod facts;
pub mod mirror;
pub mod properties;
pub mod relationships;
pub mod schema;

pub use client::{GraphClient, GraphConfig, GraphError, GraphTxn};
pub use edit::EditEngine;
pub use error::{EditError, InvalidEdit};
