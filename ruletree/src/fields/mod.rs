//! Typed field definitions.
//!
//! A [`Field`] knows how to turn a stored value into display text, how to
//! read user input back into the stored form, and how two stored values
//! compare. Stored values are canonical strings that do not depend on the
//! display format: numbers are plain decimal text, dates are `yyyy-mm-dd`
//! and times are `HH:MM:SS.mmm`.

mod number;
mod temporal;

use crate::error::{ConfigError, FieldError, INVALID_FORMAT_TEXT};
use crate::settings::FormatSettings;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, sync::Arc};

use number::NumberPattern;
use temporal::Temporal;

/// Initial value that resolves to the creation date or time of a record.
pub const NOW: &str = "now";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldType {
    #[default]
    Text,
    LongText,
    Choice,
    AutoChoice,
    Number,
    Date,
    Time,
}

impl FieldType {
    /// Pattern used when a field of this type carries an empty format.
    pub fn default_format(self) -> &'static str {
        match self {
            FieldType::Number => "#.##",
            FieldType::Date => "MMMM d, yyyy",
            FieldType::Time => "h:mm AP",
            FieldType::Choice => "1/2/3/4",
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => "",
        }
    }
}

fn default_separator() -> String {
    ", ".into()
}

/// A typed column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub initial_value: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Formatting preferences, stamped by the owning [`FieldSet`].
    #[serde(skip)]
    settings: Arc<FormatSettings>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            format: kind.default_format().to_string(),
            initial_value: String::new(),
            prefix: String::new(),
            suffix: String::new(),
            allow_multiple: false,
            separator: default_separator(),
            settings: Arc::default(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_affixes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
        self
    }

    pub fn with_initial_value(mut self, value: impl Into<String>) -> Self {
        self.initial_value = value.into();
        self
    }

    pub fn with_multiple(mut self, separator: impl Into<String>) -> Self {
        self.allow_multiple = true;
        self.separator = separator.into();
        self
    }

    pub fn settings(&self) -> &FormatSettings {
        &self.settings
    }

    pub(crate) fn stamp(&mut self, settings: Arc<FormatSettings>) {
        self.settings = settings;
    }

    /// The format in effect, falling back to the type default when empty.
    pub fn effective_format(&self) -> &str {
        if self.format.trim().is_empty() {
            self.kind.default_format()
        } else {
            &self.format
        }
    }

    /// True when entries repeat the whole output line rather than joining in place.
    pub fn repeats_lines(&self) -> bool {
        self.allow_multiple && self.separator.contains('\n')
    }

    fn format_error(&self, reason: impl Into<String>) -> FieldError {
        FieldError::InvalidFormat {
            field: self.name.clone(),
            format: self.effective_format().to_string(),
            reason: reason.into(),
        }
    }

    fn value_error(&self, value: &str, reason: impl Into<String>) -> FieldError {
        FieldError::InvalidValue {
            field: self.name.clone(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Check the format pattern without rendering anything.
    pub fn check_format(&self) -> Result<(), FieldError> {
        match self.kind {
            FieldType::Number => NumberPattern::compile(self.effective_format())
                .map(|_| ())
                .map_err(|e| self.format_error(e)),
            FieldType::Date => temporal::compile(self.effective_format(), Temporal::Date)
                .map(|_| ())
                .map_err(|e| self.format_error(e)),
            FieldType::Time => temporal::compile(self.effective_format(), Temporal::Time)
                .map(|_| ())
                .map_err(|e| self.format_error(e)),
            FieldType::Choice => self.choices().map(|_| ()),
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => Ok(()),
        }
    }

    /// Allowed values of a Choice field, in display order.
    pub fn choices(&self) -> Result<Vec<String>, FieldError> {
        let choices = split_choices(self.effective_format());
        if choices.iter().any(|c| c.is_empty()) {
            return Err(self.format_error("empty choice"));
        }
        Ok(choices)
    }

    /// Stored value → display text (without prefix/suffix).
    pub fn format(&self, stored: &str) -> Result<String, FieldError> {
        if stored.is_empty() {
            self.check_format()?;
            return Ok(String::new());
        }
        match self.kind {
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => Ok(stored.to_string()),
            FieldType::Choice => {
                self.choices()?;
                Ok(stored.to_string())
            }
            FieldType::Number => {
                let pattern = NumberPattern::compile(self.effective_format())
                    .map_err(|e| self.format_error(e))?;
                let value = number::parse_stored(stored)
                    .ok_or_else(|| self.value_error(stored, "stored value is not a number"))?;
                Ok(pattern.format(value, &self.settings))
            }
            FieldType::Date => {
                let spec = temporal::compile(self.effective_format(), Temporal::Date)
                    .map_err(|e| self.format_error(e))?;
                let date = temporal::parse_stored_date(stored)
                    .ok_or_else(|| self.value_error(stored, "stored value is not a date"))?;
                temporal::format_date(date, &spec).map_err(|e| self.format_error(e))
            }
            FieldType::Time => {
                let spec = temporal::compile(self.effective_format(), Temporal::Time)
                    .map_err(|e| self.format_error(e))?;
                let time = temporal::parse_stored_time(stored)
                    .ok_or_else(|| self.value_error(stored, "stored value is not a time"))?;
                temporal::format_time(time, &spec).map_err(|e| self.format_error(e))
            }
        }
    }

    /// Display text for a stored value, never failing.
    ///
    /// A bad pattern shows [`INVALID_FORMAT_TEXT`]; a stored value the type
    /// cannot read is shown as-is.
    pub fn display(&self, stored: &str) -> String {
        match self.format(stored) {
            Ok(text) => text,
            Err(FieldError::InvalidFormat { .. }) => INVALID_FORMAT_TEXT.to_string(),
            Err(FieldError::InvalidValue { .. }) => stored.to_string(),
        }
    }

    /// User input → stored value.
    pub fn parse(&self, input: &str) -> Result<String, FieldError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(String::new());
        }
        match self.kind {
            FieldType::Text | FieldType::LongText => Ok(input.to_string()),
            FieldType::AutoChoice => Ok(text.to_string()),
            FieldType::Choice => {
                let choices = self.choices()?;
                if choices.iter().any(|c| c == text) {
                    Ok(text.to_string())
                } else {
                    Err(self.value_error(
                        text,
                        format!("{text:?} is not one of {}", choices.join("/")),
                    ))
                }
            }
            FieldType::Number => {
                let pattern = NumberPattern::compile(self.effective_format())
                    .map_err(|e| self.format_error(e))?;
                pattern
                    .parse(text, &self.settings)
                    .or_else(|| number::parse_stored(text))
                    .map(number::canonical)
                    .ok_or_else(|| self.value_error(text, format!("{text:?} is not a number")))
            }
            FieldType::Date => {
                let spec = temporal::compile(self.effective_format(), Temporal::Date)
                    .map_err(|e| self.format_error(e))?;
                chrono::NaiveDate::parse_from_str(text, &spec)
                    .ok()
                    .or_else(|| temporal::parse_stored_date(text))
                    .map(temporal::store_date)
                    .ok_or_else(|| {
                        self.value_error(text, format!("{text:?} does not match {}", self.effective_format()))
                    })
            }
            FieldType::Time => {
                let spec = temporal::compile(self.effective_format(), Temporal::Time)
                    .map_err(|e| self.format_error(e))?;
                chrono::NaiveTime::parse_from_str(text, &spec)
                    .ok()
                    .or_else(|| temporal::parse_stored_time(text))
                    .map(temporal::store_time)
                    .ok_or_else(|| {
                        self.value_error(text, format!("{text:?} does not match {}", self.effective_format()))
                    })
            }
        }
    }

    /// Validate user input; the error's message is meant for the user.
    pub fn validate(&self, input: &str) -> Result<(), FieldError> {
        self.parse(input).map(|_| ())
    }

    /// Validate a value that is already in stored form.
    pub fn validate_stored(&self, stored: &str) -> Result<(), FieldError> {
        if stored.is_empty() {
            return Ok(());
        }
        let readable = match self.kind {
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => true,
            FieldType::Choice => self.choices()?.iter().any(|c| c == stored),
            FieldType::Number => number::parse_stored(stored).is_some(),
            FieldType::Date => temporal::parse_stored_date(stored).is_some(),
            FieldType::Time => temporal::parse_stored_time(stored).is_some(),
        };
        if readable {
            Ok(())
        } else {
            Err(self.value_error(stored, format!("{stored:?} is not a valid {:?}", self.kind)))
        }
    }

    /// Compare two stored values under this field's ordering.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.kind {
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => a.cmp(b),
            FieldType::Choice => {
                let choices = split_choices(self.effective_format());
                let rank = |v: &str| choices.iter().position(|c| c == v).unwrap_or(choices.len());
                rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
            }
            FieldType::Number => number::compare_stored(a, b),
            FieldType::Date => {
                temporal::parse_stored_date(a).cmp(&temporal::parse_stored_date(b))
            }
            FieldType::Time => {
                temporal::parse_stored_time(a).cmp(&temporal::parse_stored_time(b))
            }
        }
    }

    /// Stored value for a freshly created record, resolving `now` once.
    pub fn initial_stored_value(&self, now: NaiveDateTime) -> Option<String> {
        let init = self.initial_value.trim();
        if init.is_empty() {
            return None;
        }
        match self.kind {
            FieldType::Date if init.eq_ignore_ascii_case(NOW) => {
                Some(temporal::store_date(now.date()))
            }
            FieldType::Time if init.eq_ignore_ascii_case(NOW) => {
                Some(temporal::store_time(now.time()))
            }
            _ => Some(init.to_string()),
        }
    }

    /// True when display-affecting attributes match `other`.
    pub fn same_presentation(&self, other: &Field) -> bool {
        self.format == other.format && self.prefix == other.prefix && self.suffix == other.suffix
    }
}

fn split_choices(format: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = format.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '/' {
            if chars.peek() == Some(&'/') {
                chars.next();
                current.push('/');
            } else {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    out.push(current);
    out.into_iter().map(|c| c.trim().to_string()).collect()
}

/// Check a field name against the characters templates can reference.
pub fn validate_field_name(name: &str) -> Result<(), ConfigError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidFieldName(name.to_string()))
    }
}

pub(crate) fn is_field_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// The field map of a configuration, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: IndexMap<String, Arc<Field>>,
    settings: Arc<FormatSettings>,
}

impl FieldSet {
    pub fn new(settings: FormatSettings) -> Self {
        Self {
            fields: IndexMap::new(),
            settings: Arc::new(settings),
        }
    }

    pub fn from_fields(
        fields: impl IntoIterator<Item = Field>,
        settings: FormatSettings,
    ) -> Result<Self, ConfigError> {
        let mut set = Self::new(settings);
        for field in fields {
            set.insert(field)?;
        }
        Ok(set)
    }

    pub fn settings(&self) -> &FormatSettings {
        &self.settings
    }

    pub fn insert(&mut self, mut field: Field) -> Result<Arc<Field>, ConfigError> {
        validate_field_name(&field.name)?;
        if self.fields.contains_key(&field.name) {
            return Err(ConfigError::DuplicateField(field.name));
        }
        field.stamp(self.settings.clone());
        let field = Arc::new(field);
        self.fields.insert(field.name.clone(), field.clone());
        Ok(field)
    }

    /// Replace the definition stored under `name`, keeping its position.
    pub fn replace(&mut self, name: &str, mut field: Field) -> Result<Arc<Field>, ConfigError> {
        validate_field_name(&field.name)?;
        let idx = self
            .fields
            .get_index_of(name)
            .ok_or_else(|| ConfigError::NoSuchField(name.to_string()))?;
        if field.name != name && self.fields.contains_key(&field.name) {
            return Err(ConfigError::DuplicateField(field.name));
        }
        field.stamp(self.settings.clone());
        let field = Arc::new(field);
        self.fields.shift_remove(name);
        self.fields
            .shift_insert(idx, field.name.clone(), field.clone());
        Ok(field)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Field>> {
        self.fields.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.fields.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamped(field: Field) -> Arc<Field> {
        let mut set = FieldSet::default();
        set.insert(field).expect("insert")
    }

    #[test]
    fn text_is_identity_and_case_sensitive() {
        let f = stamped(Field::new("Name", FieldType::Text));
        assert_eq!(f.format("Ada").unwrap(), "Ada");
        assert_eq!(f.compare("B", "a"), Ordering::Less);
    }

    #[test]
    fn choice_orders_by_list_position_and_validates() {
        let f = stamped(Field::new("Size", FieldType::Choice).with_format("small/medium/large"));
        assert_eq!(f.compare("large", "small"), Ordering::Greater);
        assert_eq!(f.compare("medium", "large"), Ordering::Less);
        assert!(f.validate("medium").is_ok());
        assert!(f.validate("").is_ok());
        let err = f.validate("huge").unwrap_err();
        assert!(err.to_string().contains("small/medium/large"));
    }

    #[test]
    fn choice_supports_escaped_slash() {
        let f = stamped(Field::new("Kind", FieldType::Choice).with_format("a//b/c"));
        assert_eq!(f.choices().unwrap(), vec!["a/b".to_string(), "c".to_string()]);
        let bad = stamped(Field::new("Kind", FieldType::Choice).with_format("a/"));
        assert!(bad.check_format().unwrap_err().is_format_error());
    }

    #[test]
    fn number_parses_to_canonical_and_compares_numerically() {
        let f = stamped(Field::new("Year", FieldType::Number).with_format("0"));
        assert_eq!(f.parse("2020").unwrap(), "2020");
        assert_eq!(f.format("2020").unwrap(), "2020");
        assert_eq!(f.compare("9", "10"), Ordering::Less);
        assert!(f.validate("twenty").is_err());
    }

    #[test]
    fn invalid_number_format_shows_marker() {
        let f = stamped(Field::new("Cost", FieldType::Number).with_format("cost"));
        assert!(f.check_format().unwrap_err().is_format_error());
        assert_eq!(f.display("12"), INVALID_FORMAT_TEXT);
    }

    #[test]
    fn unreadable_stored_value_displays_raw() {
        let f = stamped(Field::new("Year", FieldType::Number).with_format("0"));
        assert_eq!(f.display("abc"), "abc");
    }

    #[test]
    fn date_storage_is_independent_of_display() {
        let f = stamped(Field::new("Due", FieldType::Date).with_format("dd/MM/yyyy"));
        assert_eq!(f.parse("05/03/2024").unwrap(), "2024-03-05");
        assert_eq!(f.parse("2024-03-05").unwrap(), "2024-03-05");
        assert_eq!(f.format("2024-03-05").unwrap(), "05/03/2024");
        assert_eq!(f.compare("2023-12-31", "2024-01-01"), Ordering::Less);
        assert!(f.validate("31/02/2024").is_err());
    }

    #[test]
    fn time_formats_twelve_hour_clock() {
        let f = stamped(Field::new("At", FieldType::Time));
        assert_eq!(f.format("14:05:00.000").unwrap(), "2:05 PM");
        assert_eq!(f.parse("2:05 PM").unwrap(), "14:05:00.000");
    }

    #[test]
    fn now_resolves_once_at_creation() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let date = Field::new("Created", FieldType::Date).with_initial_value("now");
        let time = Field::new("At", FieldType::Time).with_initial_value("now");
        let text = Field::new("Note", FieldType::Text).with_initial_value("now");
        assert_eq!(date.initial_stored_value(now).as_deref(), Some("2025-01-02"));
        assert_eq!(time.initial_stored_value(now).as_deref(), Some("08:30:00.000"));
        assert_eq!(text.initial_stored_value(now).as_deref(), Some("now"));
    }

    #[test]
    fn field_set_rejects_bad_and_duplicate_names() {
        let mut set = FieldSet::default();
        set.insert(Field::new("Name", FieldType::Text)).unwrap();
        assert_eq!(
            set.insert(Field::new("Name", FieldType::Text)).unwrap_err(),
            ConfigError::DuplicateField("Name".into())
        );
        assert!(matches!(
            set.insert(Field::new("two words", FieldType::Text)),
            Err(ConfigError::InvalidFieldName(_))
        ));
        assert!(matches!(
            set.insert(Field::new("a*b", FieldType::Text)),
            Err(ConfigError::InvalidFieldName(_))
        ));
    }

    #[test]
    fn replace_keeps_declaration_position() {
        let mut set = FieldSet::default();
        set.insert(Field::new("A", FieldType::Text)).unwrap();
        set.insert(Field::new("B", FieldType::Text)).unwrap();
        set.insert(Field::new("C", FieldType::Text)).unwrap();
        set.replace("B", Field::new("Beta", FieldType::Number)).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["A", "Beta", "C"]);
    }
}
