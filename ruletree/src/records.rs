//! Flat record storage.
//!
//! Records map field names to stored values. They are the only source of
//! truth for the tree: groups hold nothing but references back into this
//! store plus the values they captured while grouping.

use crate::error::RecordError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/* ------------------------------- IDs ------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/* ------------------------------ Values ------------------------------ */

/// A stored value; multi-valued fields keep their entries as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Single(String),
    Multiple(Vec<String>),
}

impl RecordValue {
    /// Non-empty entries in order.
    pub fn entries(&self) -> Vec<&str> {
        match self {
            RecordValue::Single(v) if v.is_empty() => Vec::new(),
            RecordValue::Single(v) => vec![v.as_str()],
            RecordValue::Multiple(vs) => vs
                .iter()
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        RecordValue::Single(value.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        RecordValue::Single(value)
    }
}

impl From<Vec<String>> for RecordValue {
    fn from(values: Vec<String>) -> Self {
        RecordValue::Multiple(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub values: IndexMap<String, RecordValue>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            id: RecordId::new(),
            values: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&RecordValue> {
        self.values.get(field)
    }

    /// The value of `field`, with an absent field reading as empty.
    pub fn entries(&self, field: &str) -> Vec<&str> {
        self.values.get(field).map(RecordValue::entries).unwrap_or_default()
    }

    /// Store a value; an empty value removes the field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<RecordValue>) {
        let field = field.into();
        let value = value.into();
        if value.is_empty() {
            self.values.shift_remove(&field);
        } else {
            self.values.insert(field, value);
        }
    }

    pub fn clear(&mut self, field: &str) {
        self.values.shift_remove(field);
    }

    pub fn rename_field(&mut self, old: &str, new: &str) {
        if let Some(idx) = self.values.get_index_of(old)
            && let Some((_, value)) = self.values.shift_remove_index(idx)
        {
            self.values.shift_insert(idx, new.to_string(), value);
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

/* ------------------------------ Edits ------------------------------ */

/// What a bulk edit does to one field of every selected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditValue {
    Set(RecordValue),
    Clear,
    /// Selected records disagree; the field is left as it is.
    Varies,
}

/* ------------------------------ Store ------------------------------ */

/// Records in insertion order, addressable by id.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: IndexMap<RecordId, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) -> RecordId {
        let id = record.id;
        self.records.insert(id, record);
        id
    }

    pub fn get(&self, id: RecordId) -> Result<&Record, RecordError> {
        self.records.get(&id).ok_or(RecordError::UnknownRecord(id))
    }

    pub fn get_mut(&mut self, id: RecordId) -> Result<&mut Record, RecordError> {
        self.records.get_mut(&id).ok_or(RecordError::UnknownRecord(id))
    }

    pub fn remove(&mut self, id: RecordId) -> Result<Record, RecordError> {
        self.records
            .shift_remove(&id)
            .ok_or(RecordError::UnknownRecord(id))
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.records.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Per-field agreement across `ids`, as shown by a multi-record editor.
    pub fn common_values<'a>(
        &self,
        ids: &[RecordId],
        field_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<IndexMap<String, EditValue>, RecordError> {
        let records = ids
            .iter()
            .map(|id| self.get(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = IndexMap::new();
        for name in field_names {
            let mut values = records.iter().map(|r| r.get(name).filter(|v| !v.is_empty()));
            let value = match values.next() {
                None => EditValue::Clear,
                Some(first) => {
                    if values.all(|v| v == first) {
                        first.cloned().map_or(EditValue::Clear, EditValue::Set)
                    } else {
                        EditValue::Varies
                    }
                }
            };
            out.insert(name.to_string(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_absent() {
        let mut r = Record::new().with_value("Name", "Ada");
        r.set("Name", "");
        assert!(r.get("Name").is_none());
        assert!(r.entries("Name").is_empty());
    }

    #[test]
    fn multiple_entries_skip_blanks() {
        let v = RecordValue::Multiple(vec!["a".into(), "".into(), "b".into()]);
        assert_eq!(v.entries(), vec!["a", "b"]);
        assert!(!v.is_empty());
        assert!(RecordValue::Multiple(vec!["".into()]).is_empty());
    }

    #[test]
    fn common_values_reports_varies() {
        let mut store = RecordStore::new();
        let a = store.insert(Record::new().with_value("Year", "2020").with_value("Tag", "x"));
        let b = store.insert(Record::new().with_value("Year", "2020").with_value("Tag", "y"));
        let common = store.common_values(&[a, b], ["Year", "Tag", "Note"]).unwrap();
        assert_eq!(common["Year"], EditValue::Set("2020".into()));
        assert_eq!(common["Tag"], EditValue::Varies);
        assert_eq!(common["Note"], EditValue::Clear);
    }

    #[test]
    fn unknown_record_is_an_error() {
        let store = RecordStore::new();
        let id = RecordId::new();
        assert_eq!(store.get(id).unwrap_err(), RecordError::UnknownRecord(id));
    }

    #[test]
    fn rename_keeps_value_position() {
        let mut r = Record::new().with_value("A", "1").with_value("B", "2");
        r.rename_field("A", "Z");
        assert_eq!(r.values.keys().collect::<Vec<_>>(), vec!["Z", "B"]);
    }
}
