//! Serialized configuration and record shapes.
//!
//! This is the boundary format: a configuration document describing fields,
//! lines and the title/rule tree, plus flat record maps. Converting a
//! document into live types validates it completely; a document that does
//! not convert is rejected as a whole.

use crate::error::ConfigError;
use crate::fields::{Field, FieldSet};
use crate::line::{AltFormat, ParsedLine};
use crate::records::RecordValue;
use crate::rules::{RuleNode, TitleChildren, TitleNode};
use crate::settings::FormatSettings;
use crate::sort::{SortKey, check_keys};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// A line template, optionally with alternate field formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineDoc {
    Plain(String),
    Detailed {
        template: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        alt_formats: IndexMap<String, AltFormat>,
    },
}

impl LineDoc {
    pub fn template(&self) -> &str {
        match self {
            LineDoc::Plain(template) | LineDoc::Detailed { template, .. } => template,
        }
    }

    pub fn to_line(&self, fields: &FieldSet) -> Result<ParsedLine, ConfigError> {
        match self {
            LineDoc::Plain(template) => ParsedLine::parse(template, fields),
            LineDoc::Detailed {
                template,
                alt_formats,
            } => ParsedLine::parse_with_alts(template, alt_formats.clone(), fields),
        }
    }

    pub fn from_line(line: &ParsedLine) -> Self {
        if line.alt_formats().is_empty() {
            LineDoc::Plain(line.to_template())
        } else {
            LineDoc::Detailed {
                template: line.to_template(),
                alt_formats: line.alt_formats().clone(),
            }
        }
    }
}

impl From<&str> for LineDoc {
    fn from(template: &str) -> Self {
        LineDoc::Plain(template.to_string())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDoc {
    pub line: LineDoc,
    #[serde(default)]
    pub sort_fields: Option<Vec<SortKey>>,
    #[serde(default)]
    pub child_sort_fields: Option<Vec<SortKey>>,
    #[serde(default)]
    pub child: Option<Box<RuleDoc>>,
}

impl RuleDoc {
    pub fn new(line: impl Into<LineDoc>) -> Self {
        Self {
            line: line.into(),
            sort_fields: None,
            child_sort_fields: None,
            child: None,
        }
    }

    pub fn to_rule(&self, fields: &FieldSet) -> Result<RuleNode, ConfigError> {
        let mut rule = RuleNode::new(self.line.to_line(fields)?)?;
        if let Some(keys) = &self.sort_fields {
            check_keys(keys, fields)?;
            rule.sort_fields = Some(keys.clone());
        }
        if let Some(keys) = &self.child_sort_fields {
            check_keys(keys, fields)?;
            rule.child_sort_fields = Some(keys.clone());
        }
        if let Some(child) = &self.child {
            rule.child = Some(Box::new(child.to_rule(fields)?));
        }
        Ok(rule)
    }

    pub fn from_rule(rule: &RuleNode) -> Self {
        Self {
            line: LineDoc::from_line(&rule.line),
            sort_fields: rule.sort_fields.clone(),
            child_sort_fields: rule.child_sort_fields.clone(),
            child: rule.child.as_deref().map(|c| Box::new(RuleDoc::from_rule(c))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleChildrenDoc {
    Titles(Vec<TitleDoc>),
    Rule(RuleDoc),
}

impl Default for TitleChildrenDoc {
    fn default() -> Self {
        TitleChildrenDoc::Titles(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleDoc {
    pub title: String,
    #[serde(default)]
    pub children: TitleChildrenDoc,
}

impl TitleDoc {
    pub fn to_title(&self, fields: &FieldSet) -> Result<TitleNode, ConfigError> {
        let node = TitleNode::new(&self.title);
        Ok(match &self.children {
            TitleChildrenDoc::Titles(titles) => node.with_titles(
                titles
                    .iter()
                    .map(|t| t.to_title(fields))
                    .collect::<Result<_, _>>()?,
            ),
            TitleChildrenDoc::Rule(rule) => node.with_rule(rule.to_rule(fields)?),
        })
    }

    pub fn from_title(title: &TitleNode) -> Self {
        Self {
            title: title.title.clone(),
            children: match &title.children {
                TitleChildren::Titles(titles) => {
                    TitleChildrenDoc::Titles(titles.iter().map(TitleDoc::from_title).collect())
                }
                TitleChildren::Rule(rule) => TitleChildrenDoc::Rule(RuleDoc::from_rule(rule)),
            },
        }
    }
}

/// Free-form flags; unknown keys survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub rich_text: bool,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub fields: Vec<Field>,
    pub title_line: LineDoc,
    #[serde(default)]
    pub output_lines: Vec<LineDoc>,
    #[serde(default)]
    pub tree: Vec<TitleDoc>,
    #[serde(default)]
    pub options: Options,
}

impl ConfigDocument {
    pub fn field_set(&self, settings: FormatSettings) -> Result<FieldSet, ConfigError> {
        FieldSet::from_fields(self.fields.iter().cloned(), settings)
    }
}

pub type RecordDoc = IndexMap<String, RecordValue>;

/// A configuration together with its records, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub config: ConfigDocument,
    #[serde(default)]
    pub records: Vec<RecordDoc>,
    #[serde(default)]
    pub settings: FormatSettings,
}

impl DataFile {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;

    const SAMPLE: &str = r##"{
        "config": {
            "fields": [
                {"name": "Name"},
                {"name": "Year", "type": "Number", "format": "0"}
            ],
            "title_line": "{*Name*}",
            "output_lines": ["{*Name*}", {"template": "Year {*Year*}", "alt_formats": {"Year": {"prefix": "#"}}}],
            "tree": [
                {"title": "By year", "children": {"rule": {"line": "{*Year*}", "sort_fields": ["-Year"]}}},
                {"title": "Empty"}
            ],
            "options": {"rich_text": false, "spell_check": true}
        },
        "records": [{"Name": "A", "Year": "2020"}, {"Name": "B", "Tags": ["x", "y"]}]
    }"##;

    #[test]
    fn parses_sample_document() {
        let data = DataFile::from_json_str(SAMPLE).unwrap();
        assert_eq!(data.config.fields[0].kind, FieldType::Text);
        assert_eq!(data.config.fields[0].separator, ", ");
        assert_eq!(data.config.fields[1].kind, FieldType::Number);
        assert_eq!(data.config.options.extra["spell_check"], serde_json::json!(true));
        assert_eq!(
            data.records[1]["Tags"],
            RecordValue::Multiple(vec!["x".into(), "y".into()])
        );

        let fields = data.config.field_set(data.settings.clone()).unwrap();
        let title = data.config.tree[0].to_title(&fields).unwrap();
        let rule = title.rule().unwrap();
        assert_eq!(rule.sort_fields(), vec![SortKey::descending("Year")]);
        assert_eq!(data.config.tree[1].children, TitleChildrenDoc::Titles(vec![]));
    }

    #[test]
    fn save_and_reload_keeps_shape() {
        let data = DataFile::from_json_str(SAMPLE).unwrap();
        let text = data.to_json_string().unwrap();
        assert!(text.contains("\"-Year\""));
        assert!(!text.contains("child_sort_fields"));
        assert_eq!(DataFile::from_json_str(&text).unwrap(), data);
    }

    #[test]
    fn rejects_unknown_sort_field() {
        let fields = FieldSet::default();
        let mut doc = RuleDoc::new("x");
        doc.sort_fields = Some(vec![SortKey::ascending("Nope")]);
        assert!(doc.to_rule(&fields).is_err());
    }

    #[test]
    fn rule_without_fields_fails_the_load() {
        let data = DataFile::from_json_str(SAMPLE).unwrap();
        let fields = data.config.field_set(FormatSettings::default()).unwrap();
        let bad = TitleDoc {
            title: "Bad".into(),
            children: TitleChildrenDoc::Rule(RuleDoc::new("static")),
        };
        assert_eq!(
            bad.to_title(&fields).unwrap_err(),
            ConfigError::RuleWithoutFields("static".into())
        );
    }
}
