//! Materialized tree with lazily computed, individually invalidated children.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Each node caches its child
//! list; mutations mark caches stale and the next [`TreeCache::child_nodes`]
//! call recomputes them. Recomputation keeps existing child nodes whenever
//! it can (groups by heading, leaves by record, titles by id) so ids held by
//! consumers stay valid. Children that disappear are moved to an obsolete
//! set instead of being dropped, until [`TreeCache::purge_obsolete`].

use crate::error::TreeError;
use crate::fields::FieldSet;
use crate::grouping::{Grouping, create_groups};
use crate::records::{Record, RecordId, RecordStore, RecordValue};
use crate::rules::{RuleNode, TitleChildren, TitleId, TitleNode, find_title};
use crate::sort::{compare_records, sort_by_keys};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A rule addressed by its title and position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleRef {
    pub title: TitleId,
    pub depth: usize,
}

impl RuleRef {
    pub fn resolve<'a>(&self, titles: &'a [TitleNode]) -> Option<&'a RuleNode> {
        find_title(titles, self.title)?.rule()?.at_depth(self.depth)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub heading: String,
    /// The rule whose line produced this heading.
    pub rule: RuleRef,
    pub records: Vec<RecordId>,
    pub captured: IndexMap<String, RecordValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Title { id: TitleId },
    Group(GroupNode),
    Leaf(RecordId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    Unbuilt,
    Fresh(Vec<NodeId>),
    Stale(Vec<NodeId>),
    Computing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Lookup only; the parent does not own through this.
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub open: bool,
    cache: CacheState,
}

impl TreeNode {
    pub fn cache(&self) -> &CacheState {
        &self.cache
    }

    pub fn group(&self) -> Option<&GroupNode> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<RecordId> {
        match self.kind {
            NodeKind::Leaf(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub recomputations: u64,
    pub groups_created: u64,
    pub groups_reused: u64,
    pub leaves_created: u64,
    pub leaves_reused: u64,
    pub invalidations: u64,
}

/// Everything a recomputation reads.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub titles: &'a [TitleNode],
    pub records: &'a RecordStore,
    pub fields: &'a FieldSet,
}

enum Plan {
    Titles(Vec<TitleId>),
    Groups {
        rule: RuleRef,
        grouping: Grouping<NodeId>,
    },
    Leaves(Vec<RecordId>),
}

#[derive(Debug, Default)]
pub struct TreeCache {
    nodes: BTreeMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
    obsolete: BTreeSet<NodeId>,
    next_id: u64,
    stats: TreeStats,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync root nodes with the top-level titles; children stay lazy.
    pub fn build(&mut self, titles: &[TitleNode]) {
        let previous = std::mem::take(&mut self.roots);
        self.roots = self.sync_titles(None, &previous, titles.iter().map(|t| t.id));
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Result<&TreeNode, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn set_open(&mut self, id: NodeId, open: bool) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))?;
        node.open = open;
        Ok(())
    }

    pub fn is_obsolete(&self, id: NodeId) -> bool {
        self.obsolete.contains(&id)
    }

    pub fn obsolete(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.obsolete.iter().copied()
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn state(&self, id: NodeId) -> Result<&CacheState, TreeError> {
        self.node(id).map(TreeNode::cache)
    }

    pub fn is_stale(&self, id: NodeId) -> bool {
        matches!(self.state(id), Ok(CacheState::Stale(_)))
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        std::iter::successors(self.nodes.get(&id).and_then(|n| n.parent), |p| {
            self.nodes.get(p).and_then(|n| n.parent)
        })
        .collect()
    }

    pub fn has_children(&self, id: NodeId, src: Sources<'_>) -> Result<bool, TreeError> {
        let node = self.node(id)?;
        if let CacheState::Fresh(children) = &node.cache {
            return Ok(!children.is_empty());
        }
        Ok(match &node.kind {
            NodeKind::Title { id: title } => match find_title(src.titles, *title) {
                Some(t) => match &t.children {
                    TitleChildren::Titles(titles) => !titles.is_empty(),
                    TitleChildren::Rule(_) => !src.records.is_empty(),
                },
                None => false,
            },
            NodeKind::Group(group) => !group.records.is_empty(),
            NodeKind::Leaf(_) => false,
        })
    }

    /// Children of `id`, computing them if the cache is missing or stale.
    ///
    /// Stale ancestors are refreshed first, from the root down, so a stale
    /// parent can never hand out children that its own refresh would drop.
    pub fn child_nodes(
        &mut self,
        id: NodeId,
        force: bool,
        src: Sources<'_>,
    ) -> Result<Vec<NodeId>, TreeError> {
        self.check_live(id)?;
        let mut chain = self.ancestors(id);
        chain.reverse();
        for ancestor in chain {
            if self.is_stale(ancestor) {
                self.recompute(ancestor, src)?;
            }
            self.check_live(id)?;
        }

        match &self.node(id)?.cache {
            CacheState::Fresh(children) if !force => Ok(children.clone()),
            _ => self.recompute(id, src),
        }
    }

    fn check_live(&self, id: NodeId) -> Result<(), TreeError> {
        self.node(id)?;
        if self.obsolete.contains(&id) {
            return Err(TreeError::ObsoleteNode(id));
        }
        Ok(())
    }

    /// Recompute the children of `id` unconditionally.
    pub fn recompute(&mut self, id: NodeId, src: Sources<'_>) -> Result<Vec<NodeId>, TreeError> {
        let previous = self.begin_compute(id)?;
        let plan = match self.plan(id, &previous, src) {
            Ok(plan) => plan,
            Err(e) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.cache = CacheState::Stale(previous);
                }
                return Err(e);
            }
        };
        let children = self.apply(id, &previous, plan);

        let keep: HashSet<NodeId> = children.iter().copied().collect();
        let dropped: Vec<NodeId> = previous.into_iter().filter(|c| !keep.contains(c)).collect();
        for child in &dropped {
            self.mark_obsolete_recursive(*child);
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.cache = CacheState::Fresh(children.clone());
        }
        self.stats.recomputations += 1;
        debug!(
            "recomputed {}: {} children, {} obsolete",
            id,
            children.len(),
            dropped.len()
        );
        Ok(children)
    }

    fn begin_compute(&mut self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))?;
        Ok(match std::mem::replace(&mut node.cache, CacheState::Computing) {
            CacheState::Computing => {
                panic!("tree node {id} re-entered while its children were being computed")
            }
            CacheState::Unbuilt => Vec::new(),
            CacheState::Fresh(children) | CacheState::Stale(children) => children,
        })
    }

    fn plan(&self, id: NodeId, previous: &[NodeId], src: Sources<'_>) -> Result<Plan, TreeError> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Title { id: title_id } => {
                let title = find_title(src.titles, *title_id).ok_or(TreeError::Detached(id))?;
                Ok(match &title.children {
                    TitleChildren::Titles(titles) => {
                        Plan::Titles(titles.iter().map(|t| t.id).collect())
                    }
                    TitleChildren::Rule(rule) => {
                        let records: Vec<&Record> = src.records.iter().collect();
                        Plan::Groups {
                            rule: RuleRef {
                                title: *title_id,
                                depth: 0,
                            },
                            grouping: create_groups(
                                rule,
                                &records,
                                src.fields,
                                &self.previous_groups(previous),
                            ),
                        }
                    }
                })
            }
            NodeKind::Group(group) => {
                let rule = group.rule.resolve(src.titles).ok_or(TreeError::Detached(id))?;
                let mut records: Vec<&Record> = group
                    .records
                    .iter()
                    .filter_map(|r| src.records.get(*r).ok())
                    .collect();
                Ok(match rule.child.as_deref() {
                    Some(child) => Plan::Groups {
                        rule: RuleRef {
                            title: group.rule.title,
                            depth: group.rule.depth + 1,
                        },
                        grouping: create_groups(
                            child,
                            &records,
                            src.fields,
                            &self.previous_groups(previous),
                        ),
                    },
                    None => {
                        let keys = rule.child_sort_fields(src.fields);
                        sort_by_keys(&mut records, &keys, |a, b, key| {
                            compare_records(a, b, key, src.fields)
                        });
                        Plan::Leaves(records.iter().map(|r| r.id).collect())
                    }
                })
            }
            NodeKind::Leaf(_) => Ok(Plan::Leaves(Vec::new())),
        }
    }

    fn previous_groups(&self, previous: &[NodeId]) -> Vec<(String, NodeId)> {
        previous
            .iter()
            .filter_map(|id| {
                let group = self.nodes.get(id)?.group()?;
                Some((group.heading.clone(), *id))
            })
            .collect()
    }

    fn apply(&mut self, id: NodeId, previous: &[NodeId], plan: Plan) -> Vec<NodeId> {
        match plan {
            Plan::Titles(titles) => self.sync_titles(Some(id), previous, titles.into_iter()),
            Plan::Groups { rule, grouping } => grouping
                .groups
                .into_iter()
                .map(|bucket| match bucket.existing {
                    Some(existing) => {
                        self.stats.groups_reused += 1;
                        self.refresh_group(existing, bucket.records, bucket.captured);
                        existing
                    }
                    None => {
                        self.stats.groups_created += 1;
                        self.alloc(
                            Some(id),
                            NodeKind::Group(GroupNode {
                                heading: bucket.heading,
                                rule,
                                records: bucket.records,
                                captured: bucket.captured,
                            }),
                        )
                    }
                })
                .collect(),
            Plan::Leaves(records) => {
                let mut by_record: HashMap<RecordId, NodeId> = previous
                    .iter()
                    .filter_map(|c| Some((self.nodes.get(c)?.record()?, *c)))
                    .collect();
                records
                    .into_iter()
                    .map(|record| match by_record.remove(&record) {
                        Some(existing) => {
                            self.stats.leaves_reused += 1;
                            existing
                        }
                        None => {
                            self.stats.leaves_created += 1;
                            self.alloc(Some(id), NodeKind::Leaf(record))
                        }
                    })
                    .collect()
            }
        }
    }

    fn sync_titles(
        &mut self,
        parent: Option<NodeId>,
        previous: &[NodeId],
        titles: impl Iterator<Item = TitleId>,
    ) -> Vec<NodeId> {
        let mut by_title: HashMap<TitleId, NodeId> = previous
            .iter()
            .filter_map(|c| match self.nodes.get(c)?.kind {
                NodeKind::Title { id } => Some((id, *c)),
                _ => None,
            })
            .collect();
        let children: Vec<NodeId> = titles
            .map(|title| {
                by_title
                    .remove(&title)
                    .unwrap_or_else(|| self.alloc(parent, NodeKind::Title { id: title }))
            })
            .collect();
        if parent.is_none() {
            for leftover in by_title.into_values() {
                self.mark_obsolete_recursive(leftover);
            }
        }
        children
    }

    fn refresh_group(
        &mut self,
        id: NodeId,
        records: Vec<RecordId>,
        captured: IndexMap<String, RecordValue>,
    ) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if let NodeKind::Group(group) = &mut node.kind
            && (group.records != records || group.captured != captured)
        {
            group.records = records;
            group.captured = captured;
            if let CacheState::Fresh(children) = &mut node.cache {
                node.cache = CacheState::Stale(std::mem::take(children));
            }
        }
    }

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            TreeNode {
                parent,
                kind,
                open: false,
                cache: CacheState::Unbuilt,
            },
        );
        id
    }

    /* --------------------------- Invalidation --------------------------- */

    /// Mark the cached children of `id` stale.
    pub fn invalidate(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id)
            && let CacheState::Fresh(children) = &mut node.cache
        {
            node.cache = CacheState::Stale(std::mem::take(children));
            self.stats.invalidations += 1;
        }
    }

    /// Invalidate every node whose children depend on any of `records`:
    /// titles that group all records, and groups that contain one of them.
    pub fn invalidate_records(&mut self, records: &[RecordId], titles: &[TitleNode]) {
        let wanted: HashSet<RecordId> = records.iter().copied().collect();
        let targets: Vec<NodeId> = self
            .live_nodes()
            .filter(|(_, node)| match &node.kind {
                NodeKind::Title { id } => {
                    find_title(titles, *id).is_some_and(|t| t.rule().is_some())
                }
                NodeKind::Group(group) => group.records.iter().any(|r| wanted.contains(r)),
                NodeKind::Leaf(_) => false,
            })
            .map(|(id, _)| id)
            .collect();
        debug!("record change invalidates {} nodes", targets.len());
        for id in targets {
            self.invalidate(id);
        }
    }

    /// Invalidate the nodes affected by a change to the rule at `depth`
    /// under `title`: whatever produces its groups and the groups themselves.
    pub fn invalidate_rule(&mut self, title: TitleId, depth: usize) {
        let targets: Vec<NodeId> = self
            .live_nodes()
            .filter(|(_, node)| match &node.kind {
                NodeKind::Title { id } => *id == title && depth == 0,
                NodeKind::Group(group) => {
                    group.rule.title == title
                        && (group.rule.depth + 1 == depth || group.rule.depth == depth)
                }
                NodeKind::Leaf(_) => false,
            })
            .map(|(id, _)| id)
            .collect();
        debug!(
            "rule change under {} at depth {} invalidates {} nodes",
            title,
            depth,
            targets.len()
        );
        for id in targets {
            self.invalidate(id);
        }
    }

    /// Invalidate a title and every group produced by its rule chain.
    pub fn invalidate_chain(&mut self, title: TitleId) {
        let targets: Vec<NodeId> = self
            .live_nodes()
            .filter(|(_, node)| match &node.kind {
                NodeKind::Title { id } => *id == title,
                NodeKind::Group(group) => group.rule.title == title,
                NodeKind::Leaf(_) => false,
            })
            .map(|(id, _)| id)
            .collect();
        for id in targets {
            self.invalidate(id);
        }
    }

    pub fn invalidate_all(&mut self) {
        let ids: Vec<NodeId> = self.live_nodes().map(|(id, _)| id).collect();
        for id in ids {
            self.invalidate(id);
        }
    }

    fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes
            .iter()
            .filter(|(id, _)| !self.obsolete.contains(*id))
            .map(|(id, node)| (*id, node))
    }

    /// Move `id` and its cached descendants to the obsolete set.
    pub fn mark_obsolete_recursive(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.obsolete.insert(next) {
                continue;
            }
            if let Some(node) = self.nodes.get(&next)
                && let CacheState::Fresh(children) | CacheState::Stale(children) = &node.cache
            {
                stack.extend(children.iter().copied());
            }
        }
    }

    /// Drop obsolete nodes from the arena; returns how many were removed.
    pub fn purge_obsolete(&mut self) -> usize {
        let purged = std::mem::take(&mut self.obsolete);
        for id in &purged {
            self.nodes.remove(id);
        }
        debug!("purged {} obsolete nodes", purged.len());
        purged.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Field, FieldType};

    struct Fixture {
        fields: FieldSet,
        records: RecordStore,
        titles: Vec<TitleNode>,
    }

    impl Fixture {
        fn new() -> Self {
            let fields = FieldSet::from_fields(
                [
                    Field::new("Name", FieldType::Text),
                    Field::new("Year", FieldType::Number).with_format("0"),
                ],
                Default::default(),
            )
            .unwrap();
            let rule = RuleNode::parse("{*Year*}", &fields).unwrap();
            let titles = vec![TitleNode::new("By year").with_rule(rule)];
            let mut records = RecordStore::new();
            for (name, year) in [("A", "2020"), ("B", "2020"), ("C", "2021")] {
                records.insert(Record::new().with_value("Name", name).with_value("Year", year));
            }
            Self {
                fields,
                records,
                titles,
            }
        }

        fn src(&self) -> Sources<'_> {
            Sources {
                titles: &self.titles,
                records: &self.records,
                fields: &self.fields,
            }
        }
    }

    fn headings(tree: &TreeCache, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| tree.node(*id).unwrap().group().unwrap().heading.clone())
            .collect()
    }

    #[test]
    fn children_are_lazy_and_cached() {
        let fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        assert_eq!(tree.state(root).unwrap(), &CacheState::Unbuilt);

        let groups = tree.child_nodes(root, false, fx.src()).unwrap();
        assert_eq!(headings(&tree, &groups), vec!["2020", "2021"]);
        assert_eq!(tree.state(groups[0]).unwrap(), &CacheState::Unbuilt);

        let again = tree.child_nodes(root, false, fx.src()).unwrap();
        assert_eq!(again, groups);
        assert_eq!(tree.stats().recomputations, 1);
    }

    #[test]
    fn leaves_follow_child_sort() {
        let fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let groups = tree.child_nodes(root, false, fx.src()).unwrap();
        let leaves = tree.child_nodes(groups[0], false, fx.src()).unwrap();
        let names: Vec<_> = leaves
            .iter()
            .map(|l| {
                let rid = tree.node(*l).unwrap().record().unwrap();
                fx.records.get(rid).unwrap().entries("Name")[0].to_string()
            })
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn forced_recompute_preserves_identity() {
        let fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let before = tree.child_nodes(root, false, fx.src()).unwrap();
        let after = tree.child_nodes(root, true, fx.src()).unwrap();
        assert_eq!(before, after);
        assert_eq!(tree.stats().groups_reused, 2);
        assert_eq!(tree.obsolete().count(), 0);
    }

    #[test]
    fn vanished_heading_becomes_obsolete() {
        let mut fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let groups = tree.child_nodes(root, false, fx.src()).unwrap();

        let c = fx.records.iter().find(|r| r.entries("Name") == ["C"]).unwrap().id;
        fx.records.get_mut(c).unwrap().set("Year", "2020");
        tree.invalidate_records(&[c], &fx.titles);

        let now = tree.child_nodes(root, false, fx.src()).unwrap();
        assert_eq!(now, vec![groups[0]]);
        assert!(tree.is_obsolete(groups[1]));
        assert_eq!(
            tree.child_nodes(groups[1], false, fx.src()),
            Err(TreeError::ObsoleteNode(groups[1]))
        );
        assert_eq!(tree.purge_obsolete(), 1);
        assert_eq!(tree.node(groups[1]), Err(TreeError::UnknownNode(groups[1])));
    }

    #[test]
    fn record_edit_leaves_unrelated_groups_fresh() {
        let mut fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let groups = tree.child_nodes(root, false, fx.src()).unwrap();
        for g in &groups {
            tree.child_nodes(*g, false, fx.src()).unwrap();
        }

        let a = fx.records.iter().find(|r| r.entries("Name") == ["A"]).unwrap().id;
        fx.records.get_mut(a).unwrap().set("Name", "Z");
        tree.invalidate_records(&[a], &fx.titles);

        assert!(tree.is_stale(root));
        assert!(tree.is_stale(groups[0]));
        assert!(!tree.is_stale(groups[1]));
    }

    #[test]
    fn bulk_record_change_marks_each_containing_group() {
        let fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let groups = tree.child_nodes(root, false, fx.src()).unwrap();
        for g in &groups {
            tree.child_nodes(*g, false, fx.src()).unwrap();
        }

        let unrelated = RecordId::new();
        tree.invalidate_records(&[unrelated], &fx.titles);
        assert!(!tree.is_stale(groups[0]));
        assert!(!tree.is_stale(groups[1]));

        let ids: Vec<RecordId> = fx.records.ids().collect();
        tree.invalidate_records(&ids, &fx.titles);
        assert!(groups.iter().all(|g| tree.is_stale(*g)));
    }

    #[test]
    fn stale_parent_is_refreshed_before_child() {
        let mut fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let groups = tree.child_nodes(root, false, fx.src()).unwrap();
        tree.child_nodes(groups[1], false, fx.src()).unwrap();

        let a = fx.records.iter().find(|r| r.entries("Name") == ["A"]).unwrap().id;
        fx.records.get_mut(a).unwrap().set("Year", "2021");
        tree.invalidate_records(&[a], &fx.titles);

        // groups[1] was not stale itself, but its membership changes once the root refreshes.
        let leaves = tree.child_nodes(groups[1], false, fx.src()).unwrap();
        assert_eq!(leaves.len(), 2);
        assert!(!tree.is_stale(root));
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn reentrant_compute_panics() {
        let fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        tree.begin_compute(root).unwrap();
        let _ = tree.recompute(root, fx.src());
    }

    #[test]
    fn detached_rule_is_reported() {
        let mut fx = Fixture::new();
        let mut tree = TreeCache::new();
        tree.build(&fx.titles);
        let root = tree.roots()[0];
        let groups = tree.child_nodes(root, false, fx.src()).unwrap();
        fx.titles.clear();
        assert_eq!(
            tree.recompute(groups[0], fx.src()),
            Err(TreeError::Detached(groups[0]))
        );
        assert!(tree.is_stale(groups[0]));
    }
}
