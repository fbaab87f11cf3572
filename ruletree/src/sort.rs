//! Multi-key stable sorting.

use crate::error::ConfigError;
use crate::fields::{FieldSet, validate_field_name};
use crate::records::Record;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::{cmp::Ordering, fmt, str::FromStr};

/// A field plus direction; written `+Name` or `-Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.descending { '-' } else { '+' };
        write!(f, "{sign}{}", self.field)
    }
}

impl FromStr for SortKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.chars().next() {
            Some('+') => (false, &s[1..]),
            Some('-') => (true, &s[1..]),
            _ => (false, s),
        };
        validate_field_name(name).map_err(|_| ConfigError::InvalidSortKey(s.to_string()))?;
        Ok(Self {
            field: name.to_string(),
            descending,
        })
    }
}

/// Stable in-place sort by `keys`, the first key being most significant.
///
/// Keys are applied from last to first, each with a stable binary-insertion
/// pass; a descending key reverses the comparator result only, so equal
/// elements keep their relative order in both directions.
pub fn sort_by_keys<T, F>(items: &mut [T], keys: &[SortKey], compare: F)
where
    F: Fn(&T, &T, &SortKey) -> Ordering,
{
    for key in keys.iter().rev() {
        insertion_pass(items, |a, b| {
            let ord = compare(a, b, key);
            if key.descending { ord.reverse() } else { ord }
        });
    }
}

fn insertion_pass<T, F>(items: &mut [T], cmp: F)
where
    F: Fn(&T, &T) -> Ordering,
{
    for idx in 1..items.len() {
        let (sorted, rest) = items.split_at(idx);
        let pos = sorted
            .partition_point(|item| cmp(item, &rest[0]) != Ordering::Greater);
        if pos < idx {
            items[pos..=idx].rotate_right(1);
        }
    }
}

/// Compare two records under one key, ignoring its direction.
///
/// Multi-entry values compare entry by entry; a missing field sorts as empty.
pub fn compare_records(a: &Record, b: &Record, key: &SortKey, fields: &FieldSet) -> Ordering {
    let Some(field) = fields.get(&key.field) else {
        return Ordering::Equal;
    };
    let left = a.entries(&key.field);
    let right = b.entries(&key.field);
    if left.is_empty() && right.is_empty() {
        return Ordering::Equal;
    }
    let pad = [""];
    let left = if left.is_empty() { pad.to_vec() } else { left };
    let right = if right.is_empty() { pad.to_vec() } else { right };
    for (x, y) in left.iter().zip(&right) {
        match field.compare(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    left.len().cmp(&right.len())
}

/// Check every key against the configured fields.
pub fn check_keys(keys: &[SortKey], fields: &FieldSet) -> Result<(), ConfigError> {
    match keys.iter().find(|k| !fields.contains(&k.field)) {
        Some(key) => Err(ConfigError::UnknownSortField(key.field.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Field, FieldType};

    #[test]
    fn sort_key_text_form() {
        assert_eq!("-Year".parse::<SortKey>().unwrap(), SortKey::descending("Year"));
        assert_eq!("+Name".parse::<SortKey>().unwrap(), SortKey::ascending("Name"));
        assert_eq!("Name".parse::<SortKey>().unwrap(), SortKey::ascending("Name"));
        assert_eq!(SortKey::descending("Year").to_string(), "-Year");
        assert!("-".parse::<SortKey>().is_err());
        assert!("+a b".parse::<SortKey>().is_err());
    }

    #[test]
    fn sort_key_serializes_as_string() {
        let keys = vec![SortKey::ascending("A"), SortKey::descending("B")];
        let json = serde_json::to_string(&keys).unwrap();
        assert_eq!(json, r#"["+A","-B"]"#);
        let back: Vec<SortKey> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keys);
    }

    #[test]
    fn first_key_is_primary_and_ties_keep_order() {
        let mut items = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
        let keys = [SortKey::ascending("n")];
        sort_by_keys(&mut items, &keys, |x, y, _| x.0.cmp(&y.0));
        assert_eq!(items, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[test]
    fn descending_does_not_reverse_ties() {
        let mut items = vec![(1, 'a'), (2, 'b'), (1, 'c'), (2, 'd')];
        let keys = [SortKey::descending("n")];
        sort_by_keys(&mut items, &keys, |x, y, _| x.0.cmp(&y.0));
        assert_eq!(items, vec![(2, 'b'), (2, 'd'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn multi_key_orders_by_primary_then_secondary() {
        let mut items = vec![(2, 1), (1, 2), (2, 0), (1, 1)];
        let keys = [SortKey::ascending("first"), SortKey::descending("second")];
        sort_by_keys(&mut items, &keys, |x, y, key| match key.field.as_str() {
            "first" => x.0.cmp(&y.0),
            _ => x.1.cmp(&y.1),
        });
        assert_eq!(items, vec![(1, 2), (1, 1), (2, 1), (2, 0)]);
    }

    #[test]
    fn records_compare_through_field_type() {
        let fields =
            FieldSet::from_fields([Field::new("Year", FieldType::Number)], Default::default())
                .unwrap();
        let a = Record::new().with_value("Year", "9");
        let b = Record::new().with_value("Year", "10");
        let key = SortKey::ascending("Year");
        assert_eq!(compare_records(&a, &b, &key, &fields), Ordering::Less);
        assert_eq!(compare_records(&Record::new(), &a, &key, &fields), Ordering::Less);
    }
}
