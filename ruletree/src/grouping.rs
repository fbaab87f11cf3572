//! Partitioning records into groups by rendered rule key.
//!
//! This is pure: it reads records and a rule and returns buckets. The tree
//! cache decides what a bucket becomes and when its children are computed.

use crate::fields::FieldSet;
use crate::records::{Record, RecordId, RecordValue};
use crate::rules::RuleNode;
use crate::sort::{compare_records, sort_by_keys};
use indexmap::IndexMap;

/// One distinct rendered key and the records that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBucket<K> {
    pub heading: String,
    pub records: Vec<RecordId>,
    /// Values of the rule's fields, taken from the first matching record.
    pub captured: IndexMap<String, RecordValue>,
    /// The previous group with the same heading, if there was one.
    pub existing: Option<K>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grouping<K> {
    pub groups: Vec<GroupBucket<K>>,
    /// Previous groups whose heading no longer occurs.
    pub obsolete: Vec<K>,
}

/// Bucket `records` by the rule line and sort the buckets.
///
/// `previous` lists the groups from the last computation as
/// `(heading, handle)` pairs; buckets with a matching heading get the handle
/// back so callers can keep the old object.
pub fn create_groups<K: Clone>(
    rule: &RuleNode,
    records: &[&Record],
    fields: &FieldSet,
    previous: &[(String, K)],
) -> Grouping<K> {
    let mut buckets: IndexMap<String, (Vec<&Record>, IndexMap<String, RecordValue>)> =
        IndexMap::new();
    for &record in records {
        let heading = rule.line.render(record);
        buckets
            .entry(heading)
            .or_insert_with(|| (Vec::new(), capture(rule, record)))
            .0
            .push(record);
    }

    let mut buckets: Vec<(String, Vec<&Record>, IndexMap<String, RecordValue>)> = buckets
        .into_iter()
        .map(|(heading, (members, captured))| (heading, members, captured))
        .collect();
    let keys = rule.sort_fields();
    sort_by_keys(&mut buckets, &keys, |a, b, key| {
        compare_records(a.1[0], b.1[0], key, fields)
    });

    let mut previous: Vec<Option<&(String, K)>> = previous.iter().map(Some).collect();
    let groups = buckets
        .into_iter()
        .map(|(heading, members, captured)| {
            let existing = previous
                .iter_mut()
                .find(|p| p.is_some_and(|(h, _)| *h == heading))
                .and_then(Option::take)
                .map(|(_, handle)| handle.clone());
            GroupBucket {
                heading,
                records: members.iter().map(|r| r.id).collect(),
                captured,
                existing,
            }
        })
        .collect();
    let obsolete = previous
        .into_iter()
        .flatten()
        .map(|(_, handle)| handle.clone())
        .collect();

    Grouping { groups, obsolete }
}

fn capture(rule: &RuleNode, record: &Record) -> IndexMap<String, RecordValue> {
    rule.line
        .field_names()
        .into_iter()
        .filter_map(|name| record.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}
