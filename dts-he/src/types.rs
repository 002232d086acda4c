//! Core types: effect tables, field definitions and cell values

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Storage format for dates (SQLite TEXT column)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The six human-effects tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HumanEffectsTable {
    Deaths,
    Injured,
    Missing,
    Affected,
    Displaced,
    DisplacementStocks,
}

impl HumanEffectsTable {
    pub const ALL: [HumanEffectsTable; 6] = [
        HumanEffectsTable::Deaths,
        HumanEffectsTable::Injured,
        HumanEffectsTable::Missing,
        HumanEffectsTable::Affected,
        HumanEffectsTable::Displaced,
        HumanEffectsTable::DisplacementStocks,
    ];

    /// Identifier used by callers ("Deaths", "DisplacementStocks", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            HumanEffectsTable::Deaths => "Deaths",
            HumanEffectsTable::Injured => "Injured",
            HumanEffectsTable::Missing => "Missing",
            HumanEffectsTable::Affected => "Affected",
            HumanEffectsTable::Displaced => "Displaced",
            HumanEffectsTable::DisplacementStocks => "DisplacementStocks",
        }
    }

    /// Physical table holding the table-specific columns
    pub fn physical_table(&self) -> &'static str {
        match self {
            HumanEffectsTable::Deaths => "deaths",
            HumanEffectsTable::Injured => "injured",
            HumanEffectsTable::Missing => "missing",
            HumanEffectsTable::Affected => "affected",
            HumanEffectsTable::Displaced => "displaced",
            HumanEffectsTable::DisplacementStocks => "displacement_stocks",
        }
    }

    /// Column prefix in the category presence table
    ///
    /// Deaths, Injured and Missing each have one metric named after the
    /// table, so their columns are unprefixed.
    pub fn presence_prefix(&self) -> &'static str {
        match self {
            HumanEffectsTable::Deaths
            | HumanEffectsTable::Injured
            | HumanEffectsTable::Missing => "",
            HumanEffectsTable::Affected => "affected_",
            HumanEffectsTable::Displaced => "displaced_",
            HumanEffectsTable::DisplacementStocks => "displacement_stocks_",
        }
    }
}

impl fmt::Display for HumanEffectsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HumanEffectsTable {
    type Err = Error;

    /// Accepts the caller identifier or the physical table name
    fn from_str(s: &str) -> Result<Self> {
        HumanEffectsTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.physical_table() == s)
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    Enum,
    Number,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    /// Distinguishes rows; participates in duplicate detection
    Dimension,
    /// Measured quantity
    Metric,
}

/// Where a field's value is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// Column on the shared `human_dsg` table
    Shared,
    /// Key inside the `human_dsg.custom` JSON map
    Custom,
    /// Column on the effect table itself
    Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub key: String,
    pub label: String,
}

impl EnumEntry {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// One logical column of an effect table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub ui_name: String,
    pub js_name: String,
    pub db_name: String,
    pub format: FieldFormat,
    pub role: FieldRole,
    pub storage: Storage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumEntry>,
}

impl FieldDef {
    /// Enum dimension stored on the effect table
    pub fn enumeration(
        ui_name: &str,
        js_name: &str,
        db_name: &str,
        values: Vec<EnumEntry>,
    ) -> Self {
        Self {
            ui_name: ui_name.to_string(),
            js_name: js_name.to_string(),
            db_name: db_name.to_string(),
            format: FieldFormat::Enum,
            role: FieldRole::Dimension,
            storage: Storage::Table,
            enum_values: values,
        }
    }

    /// Number metric stored on the effect table
    pub fn number(ui_name: &str, js_name: &str, db_name: &str) -> Self {
        Self {
            ui_name: ui_name.to_string(),
            js_name: js_name.to_string(),
            db_name: db_name.to_string(),
            format: FieldFormat::Number,
            role: FieldRole::Metric,
            storage: Storage::Table,
            enum_values: Vec::new(),
        }
    }

    /// Date dimension stored on the effect table
    pub fn date(ui_name: &str, js_name: &str, db_name: &str) -> Self {
        Self {
            ui_name: ui_name.to_string(),
            js_name: js_name.to_string(),
            db_name: db_name.to_string(),
            format: FieldFormat::Date,
            role: FieldRole::Dimension,
            storage: Storage::Table,
            enum_values: Vec::new(),
        }
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }

    pub fn is_shared(&self) -> bool {
        self.storage == Storage::Shared
    }

    pub fn is_custom(&self) -> bool {
        self.storage == Storage::Custom
    }

    pub fn is_dimension(&self) -> bool {
        self.role == FieldRole::Dimension
    }

    pub fn is_metric(&self) -> bool {
        self.role == FieldRole::Metric
    }

    pub fn has_enum_key(&self, key: &str) -> bool {
        self.enum_values.iter().any(|e| e.key == key)
    }

    /// Check the definition can be used to build SQL and validate cells
    ///
    /// Column names are interpolated into statements, so they must be plain
    /// identifiers.
    pub fn check(&self) -> Result<()> {
        if !is_identifier(&self.db_name) {
            return Err(Error::InvalidDefinition(format!(
                "db name {:?} is not a valid identifier",
                self.db_name
            )));
        }
        if self.format == FieldFormat::Enum && self.enum_values.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "enum field {} has no values",
                self.db_name
            )));
        }
        if self.format != FieldFormat::Enum && !self.enum_values.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "{:?} field {} must not list enum values",
                self.format, self.db_name
            )));
        }
        Ok(())
    }
}

/// Check every definition and reject repeated db names
pub fn check_defs(defs: &[FieldDef]) -> Result<()> {
    for (i, def) in defs.iter().enumerate() {
        def.check()?;
        if defs[..i].iter().any(|d| d.db_name == def.db_name) {
            return Err(Error::InvalidDefinition(format!(
                "db name {} appears twice",
                def.db_name
            )));
        }
    }
    Ok(())
}

/// Lowercase ASCII identifier: letter or underscore first, then letters,
/// digits or underscores
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() < 64
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Normalized cell value
///
/// Ordering compares like variants by their natural order. Mixed variants
/// never share a column, but still order deterministically by variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// Enum key
    Enum(String),
    Number(i64),
    Date(NaiveDate),
}

impl Value {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Enum(key) => serde_json::Value::String(key.clone()),
            Value::Number(n) => serde_json::Value::from(*n),
            Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Enum(key) => f.write_str(key),
            Value::Number(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Enum(key) => serializer.serialize_str(key),
            Value::Number(n) => serializer.serialize_i64(*n),
            Value::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
        }
    }
}

/// Validated cell
///
/// `Unset` (field omitted, leave stored value alone) and `Null` (clear the
/// stored value) are kept apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Unset,
    Null,
    Value(Value),
}

impl Cell {
    pub fn is_unset(&self) -> bool {
        matches!(self, Cell::Unset)
    }

    /// Value to store; `None` for both null and unset
    pub fn value(&self) -> Option<&Value> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Validated cell tagged with the field it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCell {
    pub db_name: String,
    pub storage: Storage,
    pub cell: Cell,
}

/// Raw input row, aligned with the definition list
///
/// `None` marks an omitted field, `Some(Value::Null)` an explicit null.
pub type RawRow = Vec<Option<serde_json::Value>>;
