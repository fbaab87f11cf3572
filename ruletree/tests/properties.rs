use proptest::prelude::*;
use ruletree::document::TitleChildrenDoc;
use ruletree::sort::sort_by_keys;
use ruletree::{
    Field, FieldSet, FieldType, FormatSettings, NodeId, RecordDoc, RecordId, RuleDoc, SortKey,
    Structure, TitleDoc,
};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

fn build(rows: &[(String, Option<u16>)]) -> (Structure, Vec<RecordId>) {
    let fields = FieldSet::from_fields(
        [
            Field::new("Name", FieldType::Text),
            Field::new("Year", FieldType::Number).with_format("0"),
        ],
        FormatSettings::default(),
    )
    .expect("fields");
    let mut s = Structure::new(fields, "{*Name*}").expect("structure");
    s.set_titles(&[TitleDoc {
        title: "By year".into(),
        children: TitleChildrenDoc::Rule(RuleDoc::new("{*Year*}")),
    }])
    .expect("titles");
    let ids = rows
        .iter()
        .map(|(name, year)| {
            let mut doc = RecordDoc::new();
            doc.insert("Name".into(), name.as_str().into());
            if let Some(year) = year {
                doc.insert("Year".into(), year.to_string().into());
            }
            s.insert_record(doc).expect("insert")
        })
        .collect();
    (s, ids)
}

/// Heading and member records of every group under the first root.
fn groups(s: &mut Structure) -> Vec<(String, Vec<RecordId>)> {
    let root = s.root_nodes()[0];
    let group_ids: Vec<NodeId> = s.child_nodes(root, false).expect("groups");
    group_ids
        .into_iter()
        .map(|g| {
            let heading = s.title(g).expect("heading");
            let members = s
                .child_nodes(g, false)
                .expect("leaves")
                .into_iter()
                .filter_map(|leaf| s.node(leaf).ok().and_then(|n| n.record()))
                .collect();
            (heading, members)
        })
        .collect()
}

fn rows() -> impl Strategy<Value = Vec<(String, Option<u16>)>> {
    prop::collection::vec(("[a-e]{1,3}", prop::option::of(2018u16..2023)), 0..24)
}

proptest! {
    #[test]
    fn every_record_lands_in_exactly_one_group(rows in rows()) {
        let (mut s, ids) = build(&rows);
        let groups = groups(&mut s);

        let headings: BTreeSet<&String> = groups.iter().map(|(h, _)| h).collect();
        prop_assert_eq!(headings.len(), groups.len());

        let mut seen: Vec<RecordId> = groups.iter().flat_map(|(_, m)| m.clone()).collect();
        let mut expected = ids.clone();
        seen.sort_by_key(|id| id.to_string());
        expected.sort_by_key(|id| id.to_string());
        prop_assert_eq!(seen, expected);

        for (heading, members) in &groups {
            for id in members {
                let year = s.record(*id).unwrap().entries("Year").join("");
                prop_assert_eq!(&year, heading);
            }
        }
    }

    #[test]
    fn group_order_is_deterministic(rows in rows()) {
        let (mut a, _) = build(&rows);
        let (mut b, _) = build(&rows);
        let left: Vec<String> = groups(&mut a).into_iter().map(|(h, _)| h).collect();
        let right: Vec<String> = groups(&mut b).into_iter().map(|(h, _)| h).collect();
        prop_assert_eq!(&left, &right);

        let years: Vec<i64> = left.iter().filter_map(|h| h.parse().ok()).collect();
        prop_assert!(years.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn untouched_groups_keep_their_node_ids(rows in rows(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!rows.is_empty());
        let (mut s, ids) = build(&rows);
        let root = s.root_nodes()[0];
        let before = s.child_nodes(root, false).unwrap();
        let headings: Vec<String> = before.iter().map(|g| s.title(*g).unwrap()).collect();

        let target = ids[pick.index(ids.len())];
        s.edit_record(target, &[("Name", "renamed")]).unwrap();
        let after = s.child_nodes(root, false).unwrap();
        let headings_after: Vec<String> = after.iter().map(|g| s.title(*g).unwrap()).collect();

        prop_assert_eq!(headings_after, headings);
        prop_assert_eq!(after, before);
    }

    #[test]
    fn multi_key_sort_matches_stable_std_sort(
        items in prop::collection::vec((0u8..4, 0u8..4, any::<u16>()), 0..40),
        first_desc in any::<bool>(),
        second_desc in any::<bool>(),
    ) {
        let keys = vec![
            SortKey { field: "a".into(), descending: first_desc },
            SortKey { field: "b".into(), descending: second_desc },
        ];
        let pick = |item: &(u8, u8, u16), key: &SortKey| {
            if key.field == "a" { item.0 } else { item.1 }
        };

        let mut ours = items.clone();
        sort_by_keys(&mut ours, &keys, |x, y, key| pick(x, key).cmp(&pick(y, key)));

        let mut std_sorted = items.clone();
        std_sorted.sort_by(|x, y| {
            keys.iter()
                .map(|key| {
                    let ord = pick(x, key).cmp(&pick(y, key));
                    if key.descending { ord.reverse() } else { ord }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        prop_assert_eq!(&ours, &std_sorted);

        let mut again = ours.clone();
        sort_by_keys(&mut again, &keys, |x, y, key| pick(x, key).cmp(&pick(y, key)));
        prop_assert_eq!(again, ours);
    }

    #[test]
    fn sort_key_text_round_trips(name in "[A-Za-z][A-Za-z0-9_]{0,8}", descending in any::<bool>()) {
        let key = SortKey { field: name, descending };
        let parsed: SortKey = key.to_string().parse().unwrap();
        prop_assert_eq!(parsed, key);
    }
}

#[test]
fn group_sizes_match_a_direct_count() {
    let rows: Vec<(String, Option<u16>)> = vec![
        ("a".into(), Some(2020)),
        ("b".into(), None),
        ("c".into(), Some(2020)),
        ("d".into(), Some(2019)),
    ];
    let (mut s, _) = build(&rows);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (_, year) in &rows {
        *counts
            .entry(year.map(|y| y.to_string()).unwrap_or_default())
            .or_default() += 1;
    }
    for (heading, members) in groups(&mut s) {
        assert_eq!(counts[&heading], members.len());
    }
}
