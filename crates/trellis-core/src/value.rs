//! Property fact value expressions.
//!
//! Facts store their value as a serialized expression. Relationship facts
//! always hold `entry("<uuid>")`; anything else is kept verbatim as a literal
//! and evaluated by the lookup-expression layer outside this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::EntryId;

/// A parsed property fact value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueExpression {
    /// A reference to another entry, serialized as `entry("<uuid>")`.
    EntryRef(EntryId),
    /// Any other expression text, preserved as written.
    Literal(String),
}

impl ValueExpression {
    pub fn entry(id: EntryId) -> Self {
        Self::EntryRef(id)
    }

    /// Parse serialized expression text. Never fails: unrecognized text is a literal.
    pub fn parse(text: &str) -> Self {
        match parse_entry_ref(text) {
            Some(id) => Self::EntryRef(id),
            None => Self::Literal(text.to_string()),
        }
    }

    /// The entry this expression points at, for relationship facts.
    pub fn target_entry(&self) -> Option<EntryId> {
        match self {
            Self::EntryRef(id) => Some(*id),
            Self::Literal(_) => None,
        }
    }
}

fn parse_entry_ref(text: &str) -> Option<EntryId> {
    let inner = text
        .trim()
        .strip_prefix("entry(")?
        .strip_suffix(')')?
        .trim();
    let unquoted = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))?;
    unquoted.parse().ok()
}

impl fmt::Display for ValueExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryRef(id) => write!(f, "entry(\"{id}\")"),
            Self::Literal(text) => f.write_str(text),
        }
    }
}

impl From<String> for ValueExpression {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<ValueExpression> for String {
    fn from(value: ValueExpression) -> Self {
        value.to_string()
    }
}
