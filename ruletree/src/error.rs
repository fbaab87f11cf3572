//! Error taxonomy for the engine.
//!
//! Configuration errors abort the load or edit that produced them. Field and
//! record errors stay local to one value or one record. Tree errors report
//! lookups against nodes that no longer exist in the materialized view.

use crate::records::RecordId;
use crate::rules::TitleId;
use crate::tree::NodeId;

/// Text shown in place of a value whose field carries a bad format pattern.
pub const INVALID_FORMAT_TEXT: &str = "Invalid Format";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("field {field}: invalid format {format:?} ({reason})")]
    InvalidFormat {
        field: String,
        format: String,
        reason: String,
    },
    #[error("field {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::InvalidFormat { field, .. } | FieldError::InvalidValue { field, .. } => {
                field
            }
        }
    }

    pub fn is_format_error(&self) -> bool {
        matches!(self, FieldError::InvalidFormat { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid field name {0:?}")]
    InvalidFieldName(String),
    #[error("duplicate field name {0:?}")]
    DuplicateField(String),
    #[error("template {template:?} references unknown field {field:?}")]
    UnknownField { template: String, field: String },
    #[error("malformed template {template:?}: {reason}")]
    MalformedTemplate { template: String, reason: String },
    #[error("line template is empty")]
    EmptyLine,
    #[error("rule line {0:?} does not reference any field")]
    RuleWithoutFields(String),
    #[error("sort key references unknown field {0:?}")]
    UnknownSortField(String),
    #[error("invalid sort key {0:?}")]
    InvalidSortKey(String),
    #[error("field {field:?} is still used by {site}")]
    FieldInUse { field: String, site: String },
    #[error("no output line {0}")]
    UnknownOutputLine(usize),
    #[error("no such field {0:?}")]
    NoSuchField(String),
    #[error("no title node {0}")]
    UnknownTitle(TitleId),
    #[error("title {title} has no rule at depth {depth}")]
    UnknownRule { title: TitleId, depth: usize },
    #[error("title {0} has child titles and cannot hold a rule")]
    TitleHasChildren(TitleId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("no record {0}")]
    UnknownRecord(RecordId),
    #[error("no field {0:?} in the configuration")]
    UnknownField(String),
    #[error("record rejected: {}", join_messages(.0))]
    Validation(Vec<FieldError>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("no tree node {0}")]
    UnknownNode(NodeId),
    #[error("tree node {0} was removed by a recomputation")]
    ObsoleteNode(NodeId),
    #[error("tree node {0} points at configuration that no longer exists")]
    Detached(NodeId),
}

/// Umbrella error for [`crate::Structure`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_field() {
        let err = RecordError::Validation(vec![
            FieldError::InvalidValue {
                field: "Year".into(),
                value: "abc".into(),
                reason: "not a number".into(),
            },
            FieldError::InvalidValue {
                field: "Size".into(),
                value: "huge".into(),
                reason: "not one of S/M/L".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("Year: not a number"));
        assert!(msg.contains("Size: not one of S/M/L"));
    }
}
