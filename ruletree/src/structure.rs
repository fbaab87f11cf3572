//! The controlling context.
//!
//! [`Structure`] owns the field model, the lines, the title/rule tree, the
//! records and the materialized tree. Every mutation goes through it and
//! runs in the same order: change the data, invalidate the affected cached
//! children, then notify observers. Configuration edits are applied to a
//! copy first and only swapped in once the whole copy validates.

use crate::document::{ConfigDocument, LineDoc, Options, RecordDoc, TitleDoc};
use crate::error::{ConfigError, Error, FieldError, RecordError, TreeError};
use crate::fields::{Field, FieldSet, FieldType};
use crate::line::{AltFormat, ParsedLine};
use crate::notify::{Change, ChangeKind, ChangeNotifier, SubscriptionId};
use crate::records::{EditValue, Record, RecordId, RecordStore, RecordValue};
use crate::rules::{RuleNode, TitleChildren, TitleId, TitleNode, find_title, find_title_mut};
use crate::settings::FormatSettings;
use crate::sort::{SortKey, check_keys};
use crate::tree::{NodeId, NodeKind, Sources, TreeCache, TreeNode, TreeStats};
use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Which line an alternate format applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSite {
    Title,
    Output(usize),
    Rule { title: TitleId, depth: usize },
}

/// Everything a configuration edit may touch, cloned and validated as a unit.
#[derive(Debug, Clone)]
struct Config {
    fields: FieldSet,
    title_line: ParsedLine,
    output_lines: Vec<ParsedLine>,
    titles: Vec<TitleNode>,
}

impl Config {
    fn rebind(&mut self) -> Result<(), ConfigError> {
        let fields = &self.fields;
        self.title_line.rebind(fields)?;
        for line in &mut self.output_lines {
            line.rebind(fields)?;
        }
        let mut result = Ok(());
        for title in &mut self.titles {
            title.walk_mut(&mut |t| {
                if let Some(rule) = t.rule_mut() {
                    rule.for_each_mut(&mut |r| {
                        if result.is_ok() {
                            result = r.line.rebind(fields);
                        }
                    });
                }
            });
        }
        result?;
        for title in &self.titles {
            for t in title.walk() {
                if let Some(rule) = t.rule() {
                    rule.check(fields)?;
                }
            }
        }
        Ok(())
    }

    /// Where `field` is referenced, if anywhere.
    fn field_use(&self, field: &str) -> Option<String> {
        if self.title_line.references(field) {
            return Some("the title line".into());
        }
        if let Some(idx) = self.output_lines.iter().position(|l| l.references(field)) {
            return Some(format!("output line {}", idx + 1));
        }
        self.titles.iter().flat_map(|t| t.walk()).find_map(|t| {
            t.rule()
                .and_then(|rule| rule.field_use(field))
                .map(|site| format!("{site} under title {:?}", t.title))
        })
    }

    fn rename_field(&mut self, old: &str, new: &str) {
        self.title_line.rename_field(old, new);
        for line in &mut self.output_lines {
            line.rename_field(old, new);
        }
        let rename_keys = |keys: &mut Option<Vec<SortKey>>| {
            for key in keys.iter_mut().flatten() {
                if key.field == old {
                    key.field = new.to_string();
                }
            }
        };
        for title in &mut self.titles {
            title.walk_mut(&mut |t| {
                if let Some(rule) = t.rule_mut() {
                    rule.for_each_mut(&mut |r| {
                        r.line.rename_field(old, new);
                        rename_keys(&mut r.sort_fields);
                        rename_keys(&mut r.child_sort_fields);
                    });
                }
            });
        }
    }

    fn rule_mut(&mut self, title: TitleId, depth: usize) -> Result<&mut RuleNode, ConfigError> {
        find_title_mut(&mut self.titles, title)
            .ok_or(ConfigError::UnknownTitle(title))?
            .rule_mut()
            .and_then(|r| r.at_depth_mut(depth))
            .ok_or(ConfigError::UnknownRule { title, depth })
    }
}

pub struct Structure {
    config: Config,
    records: RecordStore,
    tree: TreeCache,
    notifier: ChangeNotifier,
    auto_choices: IndexMap<String, BTreeSet<String>>,
    options: Options,
}

impl std::fmt::Debug for Structure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Structure")
            .field("fields", &self.config.fields.len())
            .field("titles", &self.config.titles.len())
            .field("records", &self.records.len())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl Structure {
    /// An empty structure whose leaves are titled by `title_line`.
    pub fn new(fields: FieldSet, title_line: &str) -> Result<Self, ConfigError> {
        let title_line = ParsedLine::parse(title_line, &fields)?;
        Ok(Self::assemble(
            Config {
                output_lines: vec![title_line.clone()],
                title_line,
                fields,
                titles: Vec::new(),
            },
            RecordStore::new(),
            Options::default(),
        ))
    }

    fn assemble(config: Config, records: RecordStore, options: Options) -> Self {
        let mut tree = TreeCache::new();
        tree.build(&config.titles);
        let mut structure = Self {
            config,
            records,
            tree,
            notifier: ChangeNotifier::new(),
            auto_choices: IndexMap::new(),
            options,
        };
        structure.rebuild_auto_choices();
        structure
    }

    /// Build a structure from its serialized configuration and records.
    ///
    /// Record fields that the configuration does not define are dropped.
    pub fn from_document(
        doc: &ConfigDocument,
        records: &[RecordDoc],
        settings: FormatSettings,
    ) -> Result<Self, Error> {
        let fields = doc.field_set(settings)?;
        for field in fields.iter() {
            if let Err(e) = field.check_format() {
                warn!("{}", e);
            }
        }
        let title_line = doc.title_line.to_line(&fields)?;
        let output_lines = doc
            .output_lines
            .iter()
            .map(|l| l.to_line(&fields))
            .collect::<Result<Vec<_>, _>>()?;
        let titles = doc
            .tree
            .iter()
            .map(|t| t.to_title(&fields))
            .collect::<Result<Vec<_>, _>>()?;

        let mut store = RecordStore::new();
        for values in records {
            let mut record = Record::new();
            for (name, value) in values {
                if fields.contains(name) {
                    record.set(name.clone(), value.clone());
                } else {
                    debug!("ignoring unknown field {:?} on import", name);
                }
            }
            store.insert(record);
        }

        info!(
            "loaded {} fields, {} titles and {} records",
            fields.len(),
            titles.len(),
            store.len()
        );
        Ok(Self::assemble(
            Config {
                fields,
                title_line,
                output_lines,
                titles,
            },
            store,
            doc.options.clone(),
        ))
    }

    pub fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            fields: self.config.fields.iter().map(|f| (**f).clone()).collect(),
            title_line: LineDoc::from_line(&self.config.title_line),
            output_lines: self.config.output_lines.iter().map(LineDoc::from_line).collect(),
            tree: self.config.titles.iter().map(TitleDoc::from_title).collect(),
            options: self.options.clone(),
        }
    }

    pub fn record_documents(&self) -> Vec<RecordDoc> {
        self.records.iter().map(|r| r.values.clone()).collect()
    }

    /* ------------------------------ Access ------------------------------ */

    pub fn fields(&self) -> &FieldSet {
        &self.config.fields
    }

    pub fn titles(&self) -> &[TitleNode] {
        &self.config.titles
    }

    pub fn title_line(&self) -> &ParsedLine {
        &self.config.title_line
    }

    pub fn output_lines(&self) -> &[ParsedLine] {
        &self.config.output_lines
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn version(&self) -> u64 {
        self.notifier.version()
    }

    pub fn tree_stats(&self) -> TreeStats {
        self.tree.stats()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&Change) + 'static) -> SubscriptionId {
        self.notifier.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Previously seen values of an AutoChoice field.
    pub fn auto_choices(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.auto_choices.get(field)
    }

    fn sources(&self) -> Sources<'_> {
        Sources {
            titles: &self.config.titles,
            records: &self.records,
            fields: &self.config.fields,
        }
    }

    fn tree_and_sources(&mut self) -> (&mut TreeCache, Sources<'_>) {
        (
            &mut self.tree,
            Sources {
                titles: &self.config.titles,
                records: &self.records,
                fields: &self.config.fields,
            },
        )
    }

    /* ------------------------------ Queries ------------------------------ */

    pub fn root_nodes(&self) -> &[NodeId] {
        self.tree.roots()
    }

    pub fn child_nodes(&mut self, id: NodeId, force: bool) -> Result<Vec<NodeId>, Error> {
        let (tree, src) = self.tree_and_sources();
        Ok(tree.child_nodes(id, force, src)?)
    }

    pub fn node(&self, id: NodeId) -> Result<&TreeNode, Error> {
        Ok(self.tree.node(id)?)
    }

    pub fn is_obsolete(&self, id: NodeId) -> bool {
        self.tree.is_obsolete(id)
    }

    pub fn purge_obsolete(&mut self) -> usize {
        self.tree.purge_obsolete()
    }

    pub fn has_children(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.tree.has_children(id, self.sources())?)
    }

    pub fn is_open(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.tree.node(id)?.open)
    }

    pub fn set_open(&mut self, id: NodeId, open: bool) -> Result<(), Error> {
        Ok(self.tree.set_open(id, open)?)
    }

    /// Display text of a node.
    pub fn title(&self, id: NodeId) -> Result<String, Error> {
        let node = self.tree.node(id)?;
        Ok(match &node.kind {
            NodeKind::Title { id: title } => find_title(&self.config.titles, *title)
                .map(|t| t.title.clone())
                .ok_or(TreeError::Detached(id))?,
            NodeKind::Group(group) => group.heading.clone(),
            NodeKind::Leaf(record) => self.config.title_line.render(self.records.get(*record)?),
        })
    }

    /// Rendered output lines of a leaf; other nodes yield their title.
    pub fn outputs(&self, id: NodeId) -> Result<Vec<String>, Error> {
        let node = self.tree.node(id)?;
        let Some(record) = node.record() else {
            return Ok(vec![self.title(id)?]);
        };
        let record = self.records.get(record)?;
        Ok(self
            .config
            .output_lines
            .iter()
            .flat_map(|line| line.render_lines(record))
            .filter(|text| !text.is_empty())
            .collect())
    }

    pub fn record(&self, id: RecordId) -> Result<&Record, Error> {
        Ok(self.records.get(id)?)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn common_values(&self, ids: &[RecordId]) -> Result<IndexMap<String, EditValue>, Error> {
        Ok(self.records.common_values(ids, self.config.fields.names())?)
    }

    /* ------------------------------ Records ------------------------------ */

    pub fn add_record(&mut self) -> RecordId {
        self.add_record_at(chrono::Local::now().naive_local())
    }

    /// Add a record holding each field's initial value, `now` resolved once.
    pub fn add_record_at(&mut self, now: NaiveDateTime) -> RecordId {
        let record = self.initial_record(now);
        self.commit_new(record)
    }

    /// Add a record pre-filled with the values captured by `node` and the
    /// groups above it, so it lands in the same place of the tree.
    pub fn add_record_under(&mut self, node: NodeId, now: NaiveDateTime) -> Result<RecordId, Error> {
        if self.tree.is_obsolete(node) {
            return Err(TreeError::ObsoleteNode(node).into());
        }
        self.tree.node(node)?;
        let mut record = self.initial_record(now);
        let mut chain = self.tree.ancestors(node);
        chain.reverse();
        chain.push(node);
        for id in chain {
            if let Some(group) = self.tree.node(id)?.group() {
                for (name, value) in &group.captured {
                    record.set(name.clone(), value.clone());
                }
            }
        }
        Ok(self.commit_new(record))
    }

    /// Insert a record given in stored form.
    pub fn insert_record(&mut self, values: RecordDoc) -> Result<RecordId, Error> {
        let mut record = Record::new();
        let mut errors = Vec::new();
        for (name, value) in values {
            let field = self
                .config
                .fields
                .get(&name)
                .ok_or_else(|| RecordError::UnknownField(name.clone()))?;
            for entry in value.entries() {
                if let Err(e) = field.validate_stored(entry) {
                    errors.push(e);
                }
            }
            record.set(name, value);
        }
        if !errors.is_empty() {
            return Err(RecordError::Validation(errors).into());
        }
        Ok(self.commit_new(record))
    }

    fn initial_record(&self, now: NaiveDateTime) -> Record {
        let mut record = Record::new();
        for field in self.config.fields.iter() {
            if let Some(value) = field.initial_stored_value(now) {
                record.set(field.name.clone(), value);
            }
        }
        record
    }

    fn commit_new(&mut self, record: Record) -> RecordId {
        note_auto_choices(&mut self.auto_choices, &self.config.fields, &record);
        let id = self.records.insert(record);
        self.tree.invalidate_records(&[id], &self.config.titles);
        self.notifier.notify(ChangeKind::RecordsAdded(vec![id]));
        id
    }

    /// Apply user input to fields of one record.
    ///
    /// Every edit is parsed first; if any field rejects its input the record
    /// is left untouched and all field errors are returned together.
    pub fn edit_record(&mut self, id: RecordId, edits: &[(&str, &str)]) -> Result<(), Error> {
        self.records.get(id)?;
        let mut parsed = Vec::with_capacity(edits.len());
        let mut errors = Vec::new();
        for (name, input) in edits {
            let field = self
                .config
                .fields
                .get(*name)
                .ok_or_else(|| RecordError::UnknownField(name.to_string()))?;
            match parse_input(field, input) {
                Ok(value) => parsed.push((name.to_string(), value)),
                Err(e) => errors.extend(e),
            }
        }
        if !errors.is_empty() {
            return Err(RecordError::Validation(errors).into());
        }

        let record = self.records.get_mut(id)?;
        for (name, value) in parsed {
            record.set(name, value);
        }
        note_auto_choices(&mut self.auto_choices, &self.config.fields, record);
        self.tree.invalidate_records(&[id], &self.config.titles);
        self.notifier.notify(ChangeKind::RecordsEdited(vec![id]));
        Ok(())
    }

    /// Apply the same stored values to several records with one notification.
    /// `Varies` leaves a field as each record has it.
    pub fn bulk_edit(
        &mut self,
        ids: &[RecordId],
        edits: &IndexMap<String, EditValue>,
    ) -> Result<(), Error> {
        for id in ids {
            self.records.get(*id)?;
        }
        let mut errors = Vec::new();
        for (name, edit) in edits {
            let field = self
                .config
                .fields
                .get(name)
                .ok_or_else(|| RecordError::UnknownField(name.clone()))?;
            if let EditValue::Set(value) = edit {
                errors.extend(
                    value
                        .entries()
                        .into_iter()
                        .filter_map(|entry| field.validate_stored(entry).err()),
                );
            }
        }
        if !errors.is_empty() {
            return Err(RecordError::Validation(errors).into());
        }

        for id in ids {
            let record = self.records.get_mut(*id)?;
            for (name, edit) in edits {
                match edit {
                    EditValue::Set(value) => record.set(name.clone(), value.clone()),
                    EditValue::Clear => record.clear(name),
                    EditValue::Varies => {}
                }
            }
        }
        for id in ids {
            note_auto_choices(&mut self.auto_choices, &self.config.fields, self.records.get(*id)?);
        }
        self.tree.invalidate_records(ids, &self.config.titles);
        self.notifier.notify(ChangeKind::RecordsEdited(ids.to_vec()));
        Ok(())
    }

    pub fn remove_record(&mut self, id: RecordId) -> Result<Record, Error> {
        let record = self.records.remove(id)?;
        self.tree.invalidate_records(&[id], &self.config.titles);
        self.notifier.notify(ChangeKind::RecordsRemoved(vec![id]));
        Ok(record)
    }

    /// Removes every listed record; repeated ids count once.
    pub fn remove_records(&mut self, ids: &[RecordId]) -> Result<Vec<Record>, Error> {
        let ids: Vec<RecordId> = ids.iter().copied().collect::<IndexSet<_>>().into_iter().collect();
        for id in &ids {
            self.records.get(*id)?;
        }
        let removed = ids
            .iter()
            .map(|id| self.records.remove(*id))
            .collect::<Result<Vec<_>, _>>()?;
        self.tree.invalidate_records(&ids, &self.config.titles);
        self.notifier.notify(ChangeKind::RecordsRemoved(ids));
        Ok(removed)
    }

    fn rebuild_auto_choices(&mut self) {
        self.auto_choices.clear();
        for record in self.records.iter() {
            note_auto_choices(&mut self.auto_choices, &self.config.fields, record);
        }
    }

    /* --------------------------- Configuration --------------------------- */

    pub fn add_field(&mut self, field: Field) -> Result<(), Error> {
        self.config.fields.insert(field)?;
        self.tree.invalidate_all();
        self.notifier.notify(ChangeKind::FieldsChanged);
        Ok(())
    }

    /// Replace the definition of `name`; a different name renames the field.
    pub fn update_field(&mut self, name: &str, field: Field) -> Result<(), Error> {
        let mut candidate = self.config.clone();
        let new_name = field.name.clone();
        candidate.fields.replace(name, field)?;
        if new_name != name {
            candidate.rename_field(name, &new_name);
        }
        candidate.rebind()?;

        self.config = candidate;
        if new_name != name {
            for record in self.records.iter_mut() {
                record.rename_field(name, &new_name);
            }
            if let Some(seen) = self.auto_choices.shift_remove(name) {
                self.auto_choices.insert(new_name, seen);
            }
        }
        self.rebuild_auto_choices();
        self.tree.invalidate_all();
        self.notifier.notify(ChangeKind::FieldsChanged);
        Ok(())
    }

    pub fn rename_field(&mut self, old: &str, new: &str) -> Result<(), Error> {
        let mut field = (**self
            .config
            .fields
            .get(old)
            .ok_or_else(|| ConfigError::NoSuchField(old.to_string()))?)
        .clone();
        field.name = new.to_string();
        self.update_field(old, field)
    }

    /// Remove a field no line or sort key refers to, clearing it from records.
    pub fn remove_field(&mut self, name: &str) -> Result<(), Error> {
        if !self.config.fields.contains(name) {
            return Err(ConfigError::NoSuchField(name.to_string()).into());
        }
        if let Some(site) = self.config.field_use(name) {
            return Err(ConfigError::FieldInUse {
                field: name.to_string(),
                site,
            }
            .into());
        }
        self.config.fields.remove(name);
        for record in self.records.iter_mut() {
            record.clear(name);
        }
        self.auto_choices.shift_remove(name);
        self.tree.invalidate_all();
        self.notifier.notify(ChangeKind::FieldsChanged);
        Ok(())
    }

    pub fn set_title_line(&mut self, template: &str) -> Result<(), Error> {
        self.config.title_line = ParsedLine::parse(template, &self.config.fields)?;
        self.notifier.notify(ChangeKind::LinesChanged);
        Ok(())
    }

    pub fn set_output_lines(&mut self, templates: &[&str]) -> Result<(), Error> {
        let lines = templates
            .iter()
            .map(|t| ParsedLine::parse(t, &self.config.fields))
            .collect::<Result<Vec<_>, _>>()?;
        self.config.output_lines = lines;
        self.notifier.notify(ChangeKind::LinesChanged);
        Ok(())
    }

    /// Set the line of the rule at `depth`; depth 0 on a title without
    /// children creates its rule.
    pub fn set_rule_line(&mut self, title: TitleId, depth: usize, template: &str) -> Result<(), Error> {
        let line = ParsedLine::parse(template, &self.config.fields)?;
        let fresh = RuleNode::new(line)?;
        let node = find_title_mut(&mut self.config.titles, title)
            .ok_or(ConfigError::UnknownTitle(title))?;
        match &mut node.children {
            TitleChildren::Rule(rule) => {
                let rule = rule
                    .at_depth_mut(depth)
                    .ok_or(ConfigError::UnknownRule { title, depth })?;
                rule.line = fresh.line;
                self.tree.invalidate_rule(title, depth);
            }
            TitleChildren::Titles(children) if !children.is_empty() => {
                return Err(ConfigError::TitleHasChildren(title).into());
            }
            TitleChildren::Titles(_) if depth > 0 => {
                return Err(ConfigError::UnknownRule { title, depth }.into());
            }
            TitleChildren::Titles(_) => {
                node.children = TitleChildren::Rule(fresh);
                self.tree.invalidate_chain(title);
            }
        }
        self.notifier.notify(ChangeKind::RulesChanged { title });
        Ok(())
    }

    /// Insert a rule directly below the rule at `depth`.
    pub fn add_child_rule(&mut self, title: TitleId, depth: usize, template: &str) -> Result<(), Error> {
        let line = ParsedLine::parse(template, &self.config.fields)?;
        let mut fresh = RuleNode::new(line)?;
        let parent = self.config.rule_mut(title, depth)?;
        fresh.child = parent.child.take();
        parent.child = Some(Box::new(fresh));
        self.tree.invalidate_chain(title);
        self.notifier.notify(ChangeKind::RulesChanged { title });
        Ok(())
    }

    /// Remove the rule at `depth` and everything below it.
    pub fn remove_rule(&mut self, title: TitleId, depth: usize) -> Result<(), Error> {
        self.config.rule_mut(title, depth)?;
        if depth == 0 {
            if let Some(node) = find_title_mut(&mut self.config.titles, title) {
                node.children = TitleChildren::Titles(Vec::new());
            }
        } else {
            self.config.rule_mut(title, depth - 1)?.child = None;
        }
        self.tree.invalidate_chain(title);
        self.notifier.notify(ChangeKind::RulesChanged { title });
        Ok(())
    }

    /// Set explicit group ordering for a rule; `None` restores the default.
    pub fn set_sort_fields(
        &mut self,
        title: TitleId,
        depth: usize,
        keys: Option<Vec<SortKey>>,
    ) -> Result<(), Error> {
        if let Some(keys) = &keys {
            check_keys(keys, &self.config.fields)?;
        }
        self.config.rule_mut(title, depth)?.sort_fields = keys;
        self.tree.invalidate_rule(title, depth);
        self.notifier.notify(ChangeKind::RulesChanged { title });
        Ok(())
    }

    /// Set explicit leaf ordering for a rule; `None` restores the default.
    pub fn set_child_sort_fields(
        &mut self,
        title: TitleId,
        depth: usize,
        keys: Option<Vec<SortKey>>,
    ) -> Result<(), Error> {
        if let Some(keys) = &keys {
            check_keys(keys, &self.config.fields)?;
        }
        self.config.rule_mut(title, depth)?.child_sort_fields = keys;
        self.tree.invalidate_rule(title, depth);
        self.notifier.notify(ChangeKind::RulesChanged { title });
        Ok(())
    }

    pub fn set_alt_format(&mut self, site: LineSite, field: &str, alt: AltFormat) -> Result<(), Error> {
        let fields = &self.config.fields;
        match site {
            LineSite::Title => {
                self.config.title_line.set_alt_format(field, alt, fields)?;
                self.notifier.notify(ChangeKind::LinesChanged);
            }
            LineSite::Output(idx) => {
                let line = self
                    .config
                    .output_lines
                    .get_mut(idx)
                    .ok_or(ConfigError::UnknownOutputLine(idx))?;
                line.set_alt_format(field, alt, fields)?;
                self.notifier.notify(ChangeKind::LinesChanged);
            }
            LineSite::Rule { title, depth } => {
                let rule = find_title_mut(&mut self.config.titles, title)
                    .ok_or(ConfigError::UnknownTitle(title))?
                    .rule_mut()
                    .and_then(|r| r.at_depth_mut(depth))
                    .ok_or(ConfigError::UnknownRule { title, depth })?;
                rule.line.set_alt_format(field, alt, fields)?;
                self.tree.invalidate_rule(title, depth);
                self.notifier.notify(ChangeKind::RulesChanged { title });
            }
        }
        Ok(())
    }

    /// Replace the whole title/rule scaffold.
    pub fn set_titles(&mut self, docs: &[TitleDoc]) -> Result<(), Error> {
        let titles = docs
            .iter()
            .map(|t| t.to_title(&self.config.fields))
            .collect::<Result<Vec<_>, _>>()?;
        self.config.titles = titles;
        self.tree.build(&self.config.titles);
        self.tree.invalidate_all();
        self.notifier.notify(ChangeKind::TitlesChanged);
        Ok(())
    }

    pub fn rename_title(&mut self, title: TitleId, text: &str) -> Result<(), Error> {
        find_title_mut(&mut self.config.titles, title)
            .ok_or(ConfigError::UnknownTitle(title))?
            .title = text.to_string();
        self.notifier.notify(ChangeKind::TitlesChanged);
        Ok(())
    }

    /// Run `f` with notifications held; observers see one change at the end.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.notifier.suspend();
        let out = f(self);
        self.notifier.resume();
        out
    }

    /* ---------------------------- Search/replace ---------------------------- */

    /// Records with a stored value containing `text`, ignoring case.
    pub fn search(&self, text: &str, field: Option<&str>) -> Result<Vec<RecordId>, Error> {
        let names = self.search_fields(field)?;
        Ok(self
            .records
            .iter()
            .filter(|record| {
                names.iter().any(|name| {
                    record
                        .entries(name)
                        .iter()
                        .any(|entry| find_ignore_case(entry, text).is_some())
                })
            })
            .map(|record| record.id)
            .collect())
    }

    /// Replace every case-insensitive occurrence of `find`, skipping values
    /// the field would reject. Returns the number of values rewritten.
    pub fn replace_all(
        &mut self,
        find: &str,
        replacement: &str,
        field: Option<&str>,
    ) -> Result<usize, Error> {
        if find.is_empty() {
            return Ok(0);
        }
        let names = self.search_fields(field)?;
        let mut changed = Vec::new();
        let mut count = 0;
        for record in self.records.iter_mut() {
            let mut touched = false;
            for name in &names {
                let Some(field) = self.config.fields.get(name) else {
                    continue;
                };
                let Some(value) = record.get(name) else {
                    continue;
                };
                let mut entries: Vec<String> = value.entries().iter().map(|e| e.to_string()).collect();
                let mut any = false;
                for entry in &mut entries {
                    let Some(next) = replace_ignore_case(entry, find, replacement) else {
                        continue;
                    };
                    match field.validate_stored(&next) {
                        Ok(()) => {
                            *entry = next;
                            any = true;
                            count += 1;
                        }
                        Err(e) => warn!("skipping replacement in record {}: {}", record.id, e),
                    }
                }
                if any {
                    let value = match value {
                        RecordValue::Single(_) => RecordValue::Single(entries.concat()),
                        RecordValue::Multiple(_) => RecordValue::Multiple(entries),
                    };
                    record.set(name.clone(), value);
                    touched = true;
                }
            }
            if touched {
                changed.push(record.id);
            }
        }
        if !changed.is_empty() {
            self.rebuild_auto_choices();
            self.tree.invalidate_records(&changed, &self.config.titles);
            self.notifier.notify(ChangeKind::RecordsEdited(changed));
        }
        Ok(count)
    }

    fn search_fields(&self, field: Option<&str>) -> Result<Vec<String>, Error> {
        match field {
            Some(name) if !self.config.fields.contains(name) => {
                Err(RecordError::UnknownField(name.to_string()).into())
            }
            Some(name) => Ok(vec![name.to_string()]),
            None => Ok(self.config.fields.names().map(str::to_string).collect()),
        }
    }
}

fn note_auto_choices(
    seen: &mut IndexMap<String, BTreeSet<String>>,
    fields: &FieldSet,
    record: &Record,
) {
    for field in fields.iter().filter(|f| f.kind == FieldType::AutoChoice) {
        let values = seen.entry(field.name.clone()).or_default();
        for entry in record.entries(&field.name) {
            values.insert(entry.to_string());
        }
    }
}

/// Turn display input into a stored value, splitting multi-entry input.
fn parse_input(field: &Field, input: &str) -> Result<RecordValue, Vec<FieldError>> {
    if !field.allow_multiple {
        return field.parse(input).map(RecordValue::Single).map_err(|e| vec![e]);
    }
    let separator = field.separator.trim();
    let parts: Vec<&str> = if field.repeats_lines() || separator.is_empty() {
        input.lines().collect()
    } else {
        input.split(separator).collect()
    };
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    for part in parts {
        match field.parse(part) {
            Ok(stored) if stored.is_empty() => {}
            Ok(stored) => entries.push(stored),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(RecordValue::Multiple(entries))
    } else {
        Err(errors)
    }
}

/// Byte offset of the first case-insensitive match of `needle`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .char_indices()
        .map(|(idx, _)| idx)
        .find(|&idx| match_len(&haystack[idx..], needle).is_some())
}

/// Length in bytes of `needle` matched at the start of `text`, ignoring case.
fn match_len(text: &str, needle: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in needle.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(idx, _)| idx))
}

fn replace_ignore_case(text: &str, find: &str, replacement: &str) -> Option<String> {
    if find.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut replaced = false;
    while let Some(start) = find_ignore_case(rest, find) {
        let len = match_len(&rest[start..], find)?;
        out.push_str(&rest[..start]);
        out.push_str(replacement);
        rest = &rest[start + len..];
        replaced = true;
    }
    out.push_str(rest);
    replaced.then_some(out)
}
