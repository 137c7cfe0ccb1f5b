//! Bulk reconcilers for connection-driven sync.
//!
//! Each reconciler reads the current state set-wise, computes an explicit
//! plan in memory, and applies it with a handful of batched statements.

pub mod set_relationships;
pub mod upsert_entries;

pub use set_relationships::{set_relationships, RelationshipDiff};
pub use upsert_entries::{upsert_entries, UpsertPlan};

use trellis_core::edits::OldValues;
use trellis_core::EditOutcome;

/// Fold the outcome of one reconciler run into the batch total.
pub(crate) fn merge_outcome(total: &mut EditOutcome, next: EditOutcome) {
    for id in next.modified_nodes {
        if !total.modified_nodes.contains(&id) {
            total.modified_nodes.push(id);
        }
    }
    total.applied_edits.extend(next.applied_edits);
    total.old_values = match (total.old_values.take(), next.old_values) {
        (None, next) => next,
        (current, None) => current,
        (Some(current), Some(next)) => Some(OldValues::Many {
            values: flatten(current).into_iter().chain(flatten(next)).collect(),
        }),
    };
}

fn flatten(values: OldValues) -> Vec<OldValues> {
    match values {
        OldValues::Many { values } => values,
        single => vec![single],
    }
}
