//! Line templates.
//!
//! A template is literal text with field references written `{*Name*}`.
//! Parsing binds every reference to its [`Field`]; rendering a record then
//! substitutes `prefix + format(value) + suffix` for each reference. The same
//! template rendered against the same record always yields the same text,
//! which is what lets rule lines act as grouping keys.

use crate::error::ConfigError;
use crate::fields::{Field, FieldSet, is_field_name_char};
use crate::records::Record;
use indexmap::IndexMap;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_until1, take_while1},
    combinator::{map, rest, verify},
    multi::many0,
    sequence::delimited,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-line override of how one field is shown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AltFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl AltFormat {
    /// True when applying this override to `field` would change nothing.
    fn is_noop_for(&self, field: &Field) -> bool {
        self.format.as_ref().is_none_or(|f| *f == field.format)
            && self.prefix.as_ref().is_none_or(|p| *p == field.prefix)
            && self.suffix.as_ref().is_none_or(|s| *s == field.suffix)
    }

    fn apply(&self, field: &Field) -> Field {
        let mut clone = field.clone();
        if let Some(format) = &self.format {
            clone.format = format.clone();
        }
        if let Some(prefix) = &self.prefix {
            clone.prefix = prefix.clone();
        }
        if let Some(suffix) = &self.suffix {
            clone.suffix = suffix.clone();
        }
        clone
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSegment {
    pub name: String,
    /// The bound definition, already carrying any alternate format.
    pub field: Arc<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Field(FieldSegment),
}

/// Where a character offset in rendered text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLocation {
    pub segment: usize,
    /// The referenced field, `None` for literal text.
    pub field: Option<String>,
    /// Offset in characters from the start of the segment's rendered text.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    segments: Vec<Segment>,
    alt_formats: IndexMap<String, AltFormat>,
}

/* ------------------------------ Parsing ------------------------------ */

enum RawSegment<'a> {
    Text(&'a str),
    Field(&'a str),
}

fn field_ref(i: &str) -> IResult<&str, RawSegment<'_>> {
    map(
        delimited(tag("{*"), take_while1(is_field_name_char), tag("*}")),
        RawSegment::Field,
    )(i)
}

fn literal(i: &str) -> IResult<&str, RawSegment<'_>> {
    map(
        alt((
            take_until1("{*"),
            verify(rest, |s: &str| !s.is_empty() && !s.contains("{*")),
        )),
        RawSegment::Text,
    )(i)
}

fn raw_segments(i: &str) -> IResult<&str, Vec<RawSegment<'_>>> {
    many0(alt((field_ref, literal)))(i)
}

impl ParsedLine {
    pub fn parse(template: &str, fields: &FieldSet) -> Result<Self, ConfigError> {
        Self::parse_with_alts(template, IndexMap::new(), fields)
    }

    /// Parse a template and install the given alternate formats.
    pub fn parse_with_alts(
        template: &str,
        alt_formats: IndexMap<String, AltFormat>,
        fields: &FieldSet,
    ) -> Result<Self, ConfigError> {
        if template.is_empty() {
            return Err(ConfigError::EmptyLine);
        }
        let malformed = |reason: String| ConfigError::MalformedTemplate {
            template: template.to_string(),
            reason,
        };
        let (remaining, raw) = raw_segments(template).map_err(|e| malformed(e.to_string()))?;
        if !remaining.is_empty() {
            return Err(malformed(format!("bad field reference at {remaining:?}")));
        }

        let mut segments = Vec::with_capacity(raw.len());
        for seg in raw {
            match seg {
                RawSegment::Text(text) => segments.push(Segment::Text(text.to_string())),
                RawSegment::Field(name) => {
                    let field = fields.get(name).ok_or_else(|| ConfigError::UnknownField {
                        template: template.to_string(),
                        field: name.to_string(),
                    })?;
                    segments.push(Segment::Field(FieldSegment {
                        name: name.to_string(),
                        field: field.clone(),
                    }));
                }
            }
        }

        let mut line = Self {
            segments,
            alt_formats,
        };
        line.rebind(fields)?;
        Ok(line)
    }

    /// Re-read field definitions after they changed.
    ///
    /// Alternate formats that no longer differ from their parent are dropped.
    pub fn rebind(&mut self, fields: &FieldSet) -> Result<(), ConfigError> {
        let template = self.to_template();
        let mut bound = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            if let Segment::Field(fs) = seg {
                let parent = fields.get(&fs.name).ok_or_else(|| ConfigError::UnknownField {
                    template: template.clone(),
                    field: fs.name.clone(),
                })?;
                bound.push(parent.clone());
            }
        }

        self.alt_formats.retain(|name, alt| {
            fields
                .get(name)
                .is_some_and(|parent| !alt.is_noop_for(parent))
        });

        let mut bound = bound.into_iter();
        for seg in &mut self.segments {
            if let Segment::Field(fs) = seg
                && let Some(parent) = bound.next()
            {
                fs.field = match self.alt_formats.get(&fs.name) {
                    Some(alt) => Arc::new(alt.apply(&parent)),
                    None => parent,
                };
            }
        }
        Ok(())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn alt_formats(&self) -> &IndexMap<String, AltFormat> {
        &self.alt_formats
    }

    /// Install or clear an alternate format for a field this line references.
    pub fn set_alt_format(
        &mut self,
        name: &str,
        alt: AltFormat,
        fields: &FieldSet,
    ) -> Result<(), ConfigError> {
        if !self.references(name) {
            return Err(ConfigError::UnknownField {
                template: self.to_template(),
                field: name.to_string(),
            });
        }
        self.alt_formats.insert(name.to_string(), alt);
        self.rebind(fields)
    }

    pub fn references(&self, name: &str) -> bool {
        self.field_names().contains(&name)
    }

    pub fn has_fields(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Field(_)))
    }

    /// Referenced fields in first-occurrence order, without duplicates.
    pub fn fields(&self) -> Vec<&Arc<Field>> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for seg in &self.segments {
            if let Segment::Field(fs) = seg
                && !seen.contains(&fs.name.as_str())
            {
                seen.push(&fs.name);
                out.push(&fs.field);
            }
        }
        out
    }

    pub fn field_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for seg in &self.segments {
            if let Segment::Field(fs) = seg
                && !out.contains(&fs.name.as_str())
            {
                out.push(&fs.name);
            }
        }
        out
    }

    /// Point references at a renamed field. Call [`ParsedLine::rebind`] afterwards.
    pub fn rename_field(&mut self, old: &str, new: &str) {
        for seg in &mut self.segments {
            if let Segment::Field(fs) = seg
                && fs.name == old
            {
                fs.name = new.to_string();
            }
        }
        if let Some(idx) = self.alt_formats.get_index_of(old)
            && let Some((_, alt)) = self.alt_formats.shift_remove_index(idx)
        {
            self.alt_formats.shift_insert(idx, new.to_string(), alt);
        }
    }

    pub fn to_template(&self) -> String {
        self.segments
            .iter()
            .map(|seg| match seg {
                Segment::Text(text) => text.clone(),
                Segment::Field(fs) => format!("{{*{}*}}", fs.name),
            })
            .collect()
    }

    /* ---------------------------- Rendering ---------------------------- */

    /// Render the record, joining repeated lines with a newline.
    pub fn render(&self, record: &Record) -> String {
        self.render_lines(record).join("\n")
    }

    /// Render the record; a field whose separator holds a newline yields one
    /// line per entry.
    pub fn render_lines(&self, record: &Record) -> Vec<String> {
        let repeat = self
            .segments
            .iter()
            .filter_map(|seg| match seg {
                Segment::Field(fs) if fs.field.repeats_lines() => {
                    Some(record.entries(&fs.name).len())
                }
                _ => None,
            })
            .max()
            .unwrap_or(0)
            .max(1);

        (0..repeat)
            .map(|idx| self.rendered_segments(record, idx).concat())
            .collect()
    }

    /// Rendered text of each segment for repetition `idx`; all empty when the
    /// line is suppressed.
    fn rendered_segments(&self, record: &Record, idx: usize) -> Vec<String> {
        let mut any_field = false;
        let mut any_value = false;
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|seg| match seg {
                Segment::Text(text) => text.clone(),
                Segment::Field(fs) => {
                    any_field = true;
                    let text = render_field(&fs.field, &record.entries(&fs.name), idx);
                    any_value |= !text.is_empty();
                    text
                }
            })
            .collect();
        if any_field && !any_value {
            vec![String::new(); parts.len()]
        } else {
            parts
        }
    }

    /// Map a character offset in the first rendered line back to its segment.
    pub fn locate(&self, record: &Record, offset: usize) -> Option<TextLocation> {
        let mut start = 0;
        for (segment, text) in self.rendered_segments(record, 0).iter().enumerate() {
            let len = text.chars().count();
            if offset < start + len {
                let field = match &self.segments[segment] {
                    Segment::Field(fs) => Some(fs.name.clone()),
                    Segment::Text(_) => None,
                };
                return Some(TextLocation {
                    segment,
                    field,
                    offset: offset - start,
                });
            }
            start += len;
        }
        None
    }
}

fn render_field(field: &Field, entries: &[&str], idx: usize) -> String {
    if field.repeats_lines() {
        return match entries.get(idx) {
            Some(value) => format!("{}{}{}", field.prefix, field.display(value), field.suffix),
            None => String::new(),
        };
    }
    let shown: Vec<String> = entries
        .iter()
        .map(|v| field.display(v))
        .filter(|v| !v.is_empty())
        .collect();
    if shown.is_empty() {
        String::new()
    } else {
        format!("{}{}{}", field.prefix, shown.join(&field.separator), field.suffix)
    }
}
