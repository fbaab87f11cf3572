//! Rule-driven grouping engine for a personal information manager.
//!
//! Flat records are organized into a tree computed on demand from
//! user-defined rules. A rule is a line template such as `{*Year*}`; every
//! distinct rendering of that template over the records becomes a group,
//! groups can be grouped again by a child rule, and the last level holds
//! the records themselves as sorted leaves.
//!
//! [`Structure`] is the entry point. It owns the configuration, the records
//! and the materialized tree, and hands out [`NodeId`]s whose children are
//! computed lazily and recomputed only where a mutation made them stale.

pub mod document;
pub mod error;
pub mod fields;
pub mod grouping;
pub mod line;
pub mod notify;
pub mod records;
pub mod rules;
pub mod settings;
pub mod sort;
pub mod structure;
pub mod tree;

pub use document::{ConfigDocument, DataFile, LineDoc, Options, RecordDoc, RuleDoc, TitleDoc};
pub use error::{ConfigError, Error, FieldError, RecordError, TreeError};
pub use fields::{Field, FieldSet, FieldType};
pub use line::{AltFormat, ParsedLine};
pub use notify::{Change, ChangeKind};
pub use records::{EditValue, Record, RecordId, RecordValue};
pub use rules::{RuleNode, TitleId, TitleNode};
pub use settings::FormatSettings;
pub use sort::SortKey;
pub use structure::{LineSite, Structure};
pub use tree::{CacheState, NodeId, NodeKind};
