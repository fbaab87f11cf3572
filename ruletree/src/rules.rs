//! The configured scaffold: title nodes and the rule chains below them.

use crate::error::ConfigError;
use crate::fields::FieldSet;
use crate::line::ParsedLine;
use crate::sort::{SortKey, check_keys};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(pub Uuid);

impl TitleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TitleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A grouping rule; at most one child rule below it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleNode {
    pub line: ParsedLine,
    /// Explicit group ordering; `None` sorts by the line's fields.
    pub sort_fields: Option<Vec<SortKey>>,
    /// Explicit leaf ordering; `None` sorts by every field.
    pub child_sort_fields: Option<Vec<SortKey>>,
    pub child: Option<Box<RuleNode>>,
}

impl RuleNode {
    pub fn new(line: ParsedLine) -> Result<Self, ConfigError> {
        if !line.has_fields() {
            return Err(ConfigError::RuleWithoutFields(line.to_template()));
        }
        Ok(Self {
            line,
            sort_fields: None,
            child_sort_fields: None,
            child: None,
        })
    }

    pub fn parse(template: &str, fields: &FieldSet) -> Result<Self, ConfigError> {
        Self::new(ParsedLine::parse(template, fields)?)
    }

    pub fn with_child(mut self, child: RuleNode) -> Self {
        self.child = Some(Box::new(child));
        self
    }

    pub fn with_sort_fields(mut self, keys: Vec<SortKey>) -> Self {
        self.sort_fields = Some(keys);
        self
    }

    pub fn with_child_sort_fields(mut self, keys: Vec<SortKey>) -> Self {
        self.child_sort_fields = Some(keys);
        self
    }

    /// Keys used to order the groups this rule produces.
    pub fn sort_fields(&self) -> Vec<SortKey> {
        match &self.sort_fields {
            Some(keys) => keys.clone(),
            None => self
                .line
                .field_names()
                .into_iter()
                .map(SortKey::ascending)
                .collect(),
        }
    }

    /// Keys used to order leaves under the last rule of a chain.
    pub fn child_sort_fields(&self, fields: &FieldSet) -> Vec<SortKey> {
        match &self.child_sort_fields {
            Some(keys) => keys.clone(),
            None => fields.names().map(SortKey::ascending).collect(),
        }
    }

    pub fn at_depth(&self, depth: usize) -> Option<&RuleNode> {
        let mut rule = self;
        for _ in 0..depth {
            rule = rule.child.as_deref()?;
        }
        Some(rule)
    }

    pub fn at_depth_mut(&mut self, depth: usize) -> Option<&mut RuleNode> {
        let mut rule = self;
        for _ in 0..depth {
            rule = rule.child.as_deref_mut()?;
        }
        Some(rule)
    }

    pub fn depth(&self) -> usize {
        self.child.as_ref().map_or(1, |c| 1 + c.depth())
    }

    /// Iterate this rule and its descendants, top-down.
    pub fn chain(&self) -> impl Iterator<Item = &RuleNode> {
        std::iter::successors(Some(self), |r| r.child.as_deref())
    }

    /// Where `field` is referenced in this chain, if anywhere.
    pub fn field_use(&self, field: &str) -> Option<String> {
        self.chain().enumerate().find_map(|(depth, rule)| {
            if rule.line.references(field) {
                Some(format!("rule line {:?}", rule.line.to_template()))
            } else if [&rule.sort_fields, &rule.child_sort_fields]
                .into_iter()
                .flatten()
                .flatten()
                .any(|k| k.field == field)
            {
                Some(format!("sort keys of rule at depth {depth}"))
            } else {
                None
            }
        })
    }

    /// Validate explicit sort keys of the whole chain.
    pub fn check(&self, fields: &FieldSet) -> Result<(), ConfigError> {
        for rule in self.chain() {
            if let Some(keys) = &rule.sort_fields {
                check_keys(keys, fields)?;
            }
            if let Some(keys) = &rule.child_sort_fields {
                check_keys(keys, fields)?;
            }
        }
        Ok(())
    }

    pub(crate) fn for_each_mut(&mut self, f: &mut impl FnMut(&mut RuleNode)) {
        f(self);
        if let Some(child) = self.child.as_deref_mut() {
            child.for_each_mut(f);
        }
    }
}

/// What sits below a title: more titles or a single rule chain, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum TitleChildren {
    Titles(Vec<TitleNode>),
    Rule(RuleNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleNode {
    pub id: TitleId,
    pub title: String,
    pub children: TitleChildren,
}

impl TitleNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: TitleId::new(),
            title: title.into(),
            children: TitleChildren::Titles(Vec::new()),
        }
    }

    pub fn with_titles(mut self, titles: Vec<TitleNode>) -> Self {
        self.children = TitleChildren::Titles(titles);
        self
    }

    pub fn with_rule(mut self, rule: RuleNode) -> Self {
        self.children = TitleChildren::Rule(rule);
        self
    }

    pub fn rule(&self) -> Option<&RuleNode> {
        match &self.children {
            TitleChildren::Rule(rule) => Some(rule),
            TitleChildren::Titles(_) => None,
        }
    }

    pub fn rule_mut(&mut self) -> Option<&mut RuleNode> {
        match &mut self.children {
            TitleChildren::Rule(rule) => Some(rule),
            TitleChildren::Titles(_) => None,
        }
    }

    pub fn child_titles(&self) -> &[TitleNode] {
        match &self.children {
            TitleChildren::Titles(titles) => titles,
            TitleChildren::Rule(_) => &[],
        }
    }

    /// Depth-first walk over this title and every title below it.
    pub fn walk(&self) -> Vec<&TitleNode> {
        let mut out = vec![self];
        for child in self.child_titles() {
            out.extend(child.walk());
        }
        out
    }

    pub(crate) fn walk_mut(&mut self, f: &mut impl FnMut(&mut TitleNode)) {
        f(self);
        if let TitleChildren::Titles(titles) = &mut self.children {
            for child in titles {
                child.walk_mut(f);
            }
        }
    }
}

pub fn find_title(titles: &[TitleNode], id: TitleId) -> Option<&TitleNode> {
    titles.iter().find_map(|t| {
        if t.id == id {
            Some(t)
        } else {
            find_title(t.child_titles(), id)
        }
    })
}

pub fn find_title_mut(titles: &mut [TitleNode], id: TitleId) -> Option<&mut TitleNode> {
    for title in titles {
        if title.id == id {
            return Some(title);
        }
        if let TitleChildren::Titles(children) = &mut title.children
            && let Some(found) = find_title_mut(children, id)
        {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Field, FieldType};

    fn fields() -> FieldSet {
        FieldSet::from_fields(
            [
                Field::new("Name", FieldType::Text),
                Field::new("Year", FieldType::Number).with_format("0"),
            ],
            Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn rule_needs_a_field_reference() {
        assert_eq!(
            RuleNode::parse("All", &fields()),
            Err(ConfigError::RuleWithoutFields("All".into()))
        );
    }

    #[test]
    fn default_sort_keys_follow_line_and_declaration_order() {
        let f = fields();
        let rule = RuleNode::parse("{*Year*}", &f).unwrap();
        assert_eq!(rule.sort_fields(), vec![SortKey::ascending("Year")]);
        assert_eq!(
            rule.child_sort_fields(&f),
            vec![SortKey::ascending("Name"), SortKey::ascending("Year")]
        );
    }

    #[test]
    fn depth_lookup_walks_the_chain() {
        let f = fields();
        let rule = RuleNode::parse("{*Year*}", &f)
            .unwrap()
            .with_child(RuleNode::parse("{*Name*}", &f).unwrap());
        assert_eq!(rule.depth(), 2);
        assert_eq!(rule.at_depth(1).unwrap().line.to_template(), "{*Name*}");
        assert!(rule.at_depth(2).is_none());
        assert!(rule.field_use("Name").is_some());
    }

    #[test]
    fn finds_nested_titles() {
        let f = fields();
        let inner = TitleNode::new("By year").with_rule(RuleNode::parse("{*Year*}", &f).unwrap());
        let id = inner.id;
        let mut titles = vec![TitleNode::new("Root").with_titles(vec![inner])];
        assert_eq!(find_title(&titles, id).unwrap().title, "By year");
        find_title_mut(&mut titles, id).unwrap().title = "Years".into();
        assert_eq!(find_title(&titles, id).unwrap().title, "Years");
    }
}
