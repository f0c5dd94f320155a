//! Declarative mapping rules
//!
//! A [`MappingRule`] describes how one external representation (a JSON
//! payload or a tabular row) becomes a [`CanonicalRecord`]. Rules are plain
//! data: agency-specific column tables are built from [`FieldSpec`]s by the
//! caller and applied here without any I/O.
//!
//! ```ignore
//! let rule = MappingRule::new("Inspection")
//!     .blank_values(&["-", "N/A"])
//!     .field(FieldSpec::text(CanonicalField::RecordName, "title"))
//!     .field(FieldSpec::date(CanonicalField::DateIssued, "inspection date").with_format("%d-%b-%Y"))
//!     .field(FieldSpec::text(CanonicalField::SourceRefId, "inspection number").required());
//!
//! let record = rule.apply(&SourceRecord::Row(row))?;
//! ```

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::canonical::CanonicalRecord;
use crate::coerce::{self, DEFAULT_ZONE};
use crate::error::{MappingError, Result};

// ============================================================================
// Source shapes
// ============================================================================

/// One tabular row. Column names match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularRow {
    columns: HashMap<String, String>,
}

impl TabularRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.columns
            .insert(column.trim().to_lowercase(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .get(&column.trim().to_lowercase())
            .map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for TabularRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = TabularRow::new();
        for (column, value) in iter {
            row.insert(column.as_ref(), value);
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Json(Map<String, Value>),
    Row(TabularRow),
}

impl SourceRecord {
    /// Value behind `key`. JSON keys may be dotted paths (`permit.number`).
    fn lookup(&self, key: &str) -> Option<Value> {
        match self {
            SourceRecord::Json(map) => {
                let mut parts = key.split('.');
                let first = map.get(parts.next()?)?;
                parts
                    .try_fold(first, |value, part| value.get(part))
                    .cloned()
            }
            SourceRecord::Row(row) => row.get(key).map(|s| Value::String(s.to_string())),
        }
    }
}

// ============================================================================
// Field specifications
// ============================================================================

/// Canonical field a [`FieldSpec`] writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalField {
    RecordName,
    DateIssued,
    IssuingAgency,
    Author,
    LegislationAct,
    LegislationSection,
    LegislationSubSection,
    LegislationParagraph,
    LegislationDescription,
    IssuedToType,
    IssuedToCompanyName,
    IssuedToFullName,
    ProjectName,
    Location,
    Description,
    Summary,
    OutcomeDescription,
    Penalties,
    SourceRefId,
    /// Free-form attribute kept under its own key
    Attribute(String),
}

impl CanonicalField {
    fn accepts(&self, coercion: &Coercion) -> bool {
        match self {
            CanonicalField::DateIssued => matches!(coercion, Coercion::Date { .. }),
            CanonicalField::Penalties => matches!(coercion, Coercion::List { .. }),
            CanonicalField::Attribute(_) => true,
            _ => matches!(coercion, Coercion::Text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// Source key, column name, or dotted JSON path
    Key(String),
    /// First non-blank of several keys
    FirstOf(Vec<String>),
    Constant(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coercion {
    Text,
    /// Date text; `format` is a chrono layout tried before the built-in ones
    Date { format: Option<String> },
    /// JSON arrays as-is; text is split on `separator`
    List { separator: char },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub target: CanonicalField,
    pub source: FieldSource,
    pub coercion: Coercion,
    pub required: bool,
}

impl FieldSpec {
    pub fn text(target: CanonicalField, key: &str) -> Self {
        Self::new(target, FieldSource::Key(key.to_string()), Coercion::Text)
    }

    pub fn date(target: CanonicalField, key: &str) -> Self {
        Self::new(target, FieldSource::Key(key.to_string()), Coercion::Date { format: None })
    }

    pub fn list(target: CanonicalField, key: &str, separator: char) -> Self {
        Self::new(target, FieldSource::Key(key.to_string()), Coercion::List { separator })
    }

    pub fn constant(target: CanonicalField, value: impl Into<Value>) -> Self {
        Self::new(target, FieldSource::Constant(value.into()), Coercion::Text)
    }

    pub fn first_of(target: CanonicalField, keys: &[&str]) -> Self {
        Self::new(
            target,
            FieldSource::FirstOf(keys.iter().map(|k| k.to_string()).collect()),
            Coercion::Text,
        )
    }

    fn new(target: CanonicalField, source: FieldSource, coercion: Coercion) -> Self {
        Self {
            target,
            source,
            coercion,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        if let Coercion::Date { format: slot } = &mut self.coercion {
            *slot = Some(format.to_string());
        }
        self
    }

    fn label(&self) -> String {
        match &self.source {
            FieldSource::Key(key) => key.clone(),
            FieldSource::FirstOf(keys) => keys.join("|"),
            FieldSource::Constant(_) => format!("{:?}", self.target),
        }
    }
}

// ============================================================================
// Rule
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    pub record_type: String,
    pub fields: Vec<FieldSpec>,
    /// Zone for date-only text
    pub zone: Tz,
    /// Source values treated as absent
    pub blank_values: Vec<String>,
}

impl MappingRule {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            fields: Vec::new(),
            zone: DEFAULT_ZONE,
            blank_values: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    pub fn blank_values(mut self, values: &[&str]) -> Self {
        self.blank_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Check that every field's coercion suits its target and that no
    /// attribute shadows a dedicated field.
    pub fn validate(&self) -> Result<()> {
        if self.record_type.trim().is_empty() {
            return Err(MappingError::InvalidRule("record type is empty".to_string()));
        }
        for spec in &self.fields {
            if let CanonicalField::Attribute(name) = &spec.target {
                if name.is_empty() || CanonicalRecord::RESERVED_KEYS.contains(&name.as_str()) {
                    return Err(MappingError::InvalidRule(format!(
                        "attribute name '{}' is reserved",
                        name
                    )));
                }
            }
            if !spec.target.accepts(&spec.coercion) {
                return Err(MappingError::InvalidRule(format!(
                    "{:?} cannot take a {:?} value",
                    spec.target, spec.coercion
                )));
            }
        }
        Ok(())
    }

    /// Apply the rule. Fields not named by the rule are dropped.
    pub fn apply(&self, source: &SourceRecord) -> Result<CanonicalRecord> {
        self.validate()?;

        let mut record = CanonicalRecord::new(self.record_type.clone());
        for spec in &self.fields {
            let value = self.resolve(spec, source);
            if spec.required && value.is_none() {
                return Err(MappingError::unmappable(&self.record_type, spec.label()));
            }
            self.assign(&mut record, spec, value);
        }
        Ok(record)
    }

    fn resolve(&self, spec: &FieldSpec, source: &SourceRecord) -> Option<Value> {
        match &spec.source {
            FieldSource::Constant(value) => Some(value.clone()),
            FieldSource::Key(key) => self.present(source.lookup(key)),
            FieldSource::FirstOf(keys) => keys.iter().find_map(|key| self.present(source.lookup(key))),
        }
    }

    /// Drop null, blank, and configured placeholder values.
    fn present(&self, value: Option<Value>) -> Option<Value> {
        match value? {
            Value::Null => None,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || self.blank_values.iter().any(|b| b == trimmed) {
                    None
                } else {
                    Some(Value::String(trimmed.to_string()))
                }
            }
            other => Some(other),
        }
    }

    fn assign(&self, record: &mut CanonicalRecord, spec: &FieldSpec, value: Option<Value>) {
        let value = value.as_ref();
        let text = || coerce::text(value);

        match &spec.target {
            CanonicalField::RecordName => record.record_name = text(),
            CanonicalField::DateIssued => record.date_issued = self.coerce_date(value, &spec.coercion),
            CanonicalField::IssuingAgency => record.issuing_agency = text(),
            CanonicalField::Author => record.author = text(),
            CanonicalField::LegislationAct => record.legislation.act = text(),
            CanonicalField::LegislationSection => record.legislation.section = text(),
            CanonicalField::LegislationSubSection => record.legislation.sub_section = text(),
            CanonicalField::LegislationParagraph => record.legislation.paragraph = text(),
            CanonicalField::LegislationDescription => record.legislation_description = text(),
            CanonicalField::IssuedToType => record.issued_to.entity_type = text(),
            CanonicalField::IssuedToCompanyName => record.issued_to.company_name = text(),
            CanonicalField::IssuedToFullName => record.issued_to.full_name = text(),
            CanonicalField::ProjectName => record.project_name = text(),
            CanonicalField::Location => record.location = text(),
            CanonicalField::Description => record.description = text(),
            CanonicalField::Summary => record.summary = text(),
            CanonicalField::OutcomeDescription => record.outcome_description = text(),
            CanonicalField::Penalties => record.penalties = coerce_list(value, &spec.coercion),
            CanonicalField::SourceRefId => record.source_ref_id = text(),
            CanonicalField::Attribute(name) => {
                let coerced = match &spec.coercion {
                    Coercion::Text => value.map(|v| Value::String(coerce::text(Some(v)))),
                    Coercion::Date { .. } => self
                        .coerce_date(value, &spec.coercion)
                        .map(|d| Value::String(d.to_rfc3339())),
                    Coercion::List { .. } => Some(Value::from(coerce_list(value, &spec.coercion))),
                };
                record
                    .attributes
                    .insert(name.clone(), coerced.unwrap_or(Value::Null));
            }
        }
    }

    fn coerce_date(&self, value: Option<&Value>, coercion: &Coercion) -> Option<DateTime<Utc>> {
        if let (Coercion::Date { format: Some(format) }, Some(Value::String(text))) = (coercion, value) {
            if let Some(instant) = parse_with_format(text, format, self.zone) {
                return Some(instant);
            }
        }
        coerce::date(value, self.zone)
    }
}

fn parse_with_format(text: &str, format: &str, zone: Tz) -> Option<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(text.trim(), format).ok()?;
    zone.from_local_datetime(&day.and_hms_opt(0, 0, 0)?)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
}

fn coerce_list(value: Option<&Value>, coercion: &Coercion) -> Vec<String> {
    match (value, coercion) {
        (Some(Value::String(s)), Coercion::List { separator }) => s
            .split(*separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        _ => coerce::text_list(value),
    }
}
