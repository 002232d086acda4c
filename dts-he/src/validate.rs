//! Row validation and normalization
//!
//! Raw rows arrive in one of two modes:
//! - native: numbers are JSON numbers, enums and dates are strings
//! - string mode (CSV import): every cell is a string, `""` means null
//!
//! Both normalize to the same [`Cell`] values, so a row stored from either
//! mode reads back identically.

use crate::error::HeError;
use crate::types::{Cell, FieldDef, FieldFormat, RawRow, ValidCell, Value, DATE_FORMAT};
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value as Json};

/// Validate one raw row against `defs`
///
/// `raw[i]` belongs to `defs[i]`; entries past the end of `raw` count as
/// omitted. With `allow_partial` an omitted field becomes [`Cell::Unset`]
/// (leave the stored value alone), otherwise it is rejected. Stops at the
/// first invalid field.
pub fn validate_row(
    defs: &[FieldDef],
    raw: &[Option<Json>],
    string_mode: bool,
    allow_partial: bool,
) -> Result<Vec<ValidCell>, HeError> {
    if raw.len() > defs.len() {
        return Err(HeError::invalid_value(format!(
            "Row has {} values but only {} fields are defined",
            raw.len(),
            defs.len()
        )));
    }

    defs.iter()
        .enumerate()
        .map(|(i, def)| {
            let raw = raw.get(i).and_then(Option::as_ref);
            let cell = validate_cell(def, raw, string_mode, allow_partial)?;
            Ok(ValidCell {
                db_name: def.db_name.clone(),
                storage: def.storage,
                cell,
            })
        })
        .collect()
}

fn validate_cell(
    def: &FieldDef,
    raw: Option<&Json>,
    string_mode: bool,
    allow_partial: bool,
) -> Result<Cell, HeError> {
    let value = match raw {
        None if allow_partial => return Ok(Cell::Unset),
        None => {
            return Err(HeError::invalid_value(format!(
                "Undefined value in row for field {}",
                def.js_name
            )))
        }
        Some(Json::Null) => return Ok(Cell::Null),
        Some(Json::String(s)) if string_mode && s.is_empty() => return Ok(Cell::Null),
        Some(v) => v,
    };

    let normalized = match def.format {
        FieldFormat::Enum => parse_enum(def, value),
        FieldFormat::Number => parse_number(value, string_mode),
        FieldFormat::Date => parse_date(value),
    };

    normalized.map(Cell::Value).ok_or_else(|| {
        HeError::invalid_value(format!(
            "Invalid value for field {}: {}",
            def.js_name,
            describe(value)
        ))
    })
}

fn parse_enum(def: &FieldDef, value: &Json) -> Option<Value> {
    match value {
        Json::String(key) if def.has_enum_key(key) => Some(Value::Enum(key.clone())),
        _ => None,
    }
}

/// Any numeric value that is a whole number fitting in `i64`
///
/// String mode parses the trimmed text as a float first, so `"3.0"` and
/// `"1e3"` are accepted. Fractions and NaN are rejected.
fn parse_number(value: &Json, string_mode: bool) -> Option<Value> {
    let n = match value {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral))?,
        Json::String(s) if string_mode => {
            let text = s.trim();
            match text.parse::<i64>() {
                Ok(n) => n,
                Err(_) => text.parse::<f64>().ok().and_then(integral)?,
            }
        }
        _ => return None,
    };
    Some(Value::Number(n))
}

fn integral(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to its date
fn parse_date(value: &Json) -> Option<Value> {
    let text = value.as_str()?.trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
        .map(Value::Date)
}

fn describe(value: &Json) -> String {
    match value {
        Json::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

/// Build a positional raw row from an object keyed by `jsName`
///
/// Missing keys stay omitted. Keys that match no definition are rejected so
/// a typo can't silently drop a value.
pub fn raw_row_from_object(
    defs: &[FieldDef],
    object: &Map<String, Json>,
) -> Result<RawRow, HeError> {
    if let Some(unknown) = object.keys().find(|k| !defs.iter().any(|d| &d.js_name == *k)) {
        return Err(HeError::invalid_value(format!("Unknown field: {}", unknown)));
    }
    Ok(defs.iter().map(|d| object.get(&d.js_name).cloned()).collect())
}
