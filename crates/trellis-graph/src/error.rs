//! Error types for edits.
//!
//! `InvalidEdit` means the request itself cannot be applied and is safe to
//! show to the user who made it. Anything else is a store failure.

use thiserror::Error;

use crate::client::GraphError;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Invalid edit: {0}")]
    InvalidEdit(#[from] InvalidEdit),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidEdit {
    #[error("Entry {entry_id} does not exist in this site")]
    EntryNotFound { entry_id: String },

    #[error("Property {property_key:?} does not exist in this site")]
    PropertyNotFound { property_key: String },

    #[error("Property {property_key:?} does not apply to entries of type {entry_type_key:?}")]
    PropertyNotApplicable {
        property_key: String,
        entry_type_key: String,
    },

    #[error("Property {property_key:?} is not a relationship property")]
    NotARelationshipProperty { property_key: String },

    #[error("Relationship target entry {target:?} does not exist in this site")]
    RelationshipTargetNotFound { target: String },

    #[error("Relationship value {value:?} must be of the form entry(\"<id>\")")]
    MalformedRelationshipValue { value: String },

    #[error("Property fact {fact_id} does not exist on entry {entry_id}")]
    PropertyFactNotFound { fact_id: String, entry_id: String },

    #[error("Entry type {entry_type_key:?} does not exist in this site")]
    EntryTypeNotFound { entry_type_key: String },

    #[error("Connection {connection_id} does not exist in this site")]
    ConnectionNotFound { connection_id: String },

    #[error("Id or key conflict: {detail}")]
    IdConflict { detail: String },

    #[error(
        "Expected {expected} results for {operation} but got {actual}; check entry ids, keys, and properties"
    )]
    OutcomeCountMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, EditError>;

/// Whether a store error was raised by a uniqueness constraint.
pub(crate) fn is_constraint_violation(err: &GraphError) -> bool {
    err.to_string().contains("ConstraintValidationFailed")
}

/// Map uniqueness violations to [`InvalidEdit::IdConflict`]; pass everything else through.
pub(crate) fn map_conflict(err: GraphError, detail: impl Into<String>) -> EditError {
    if is_constraint_violation(&err) {
        InvalidEdit::IdConflict {
            detail: detail.into(),
        }
        .into()
    } else {
        err.into()
    }
}
