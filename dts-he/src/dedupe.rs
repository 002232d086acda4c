//! Duplicate dimension detection
//!
//! Two rows of a record collide when every dimension value is equal.
//! Values are compared after normalization, so `"2024-01-01"` stored as a
//! date and the same date typed in by hand compare equal, while the enum key
//! `"1"` and the number `1` never do. Null equals null.

use crate::error::HeError;
use crate::types::{FieldDef, Value};
use std::collections::BTreeSet;

/// Flag every row whose dimension values match another row
///
/// `ids[i]` names `data[i]`; `data[i][j]` belongs to `defs[j]`. Metrics are
/// ignored. Returns one error per offending row, sorted by row id.
pub fn find_duplicates(
    defs: &[FieldDef],
    ids: &[String],
    data: &[Vec<Option<Value>>],
) -> Vec<HeError> {
    let dims: Vec<usize> = defs
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_dimension())
        .map(|(i, _)| i)
        .collect();

    let key = |row: &[Option<Value>]| -> Vec<Option<Value>> {
        dims.iter().map(|&j| row.get(j).cloned().flatten()).collect()
    };
    let keys: Vec<_> = data.iter().map(|row| key(row.as_slice())).collect();

    let mut flagged = BTreeSet::new();
    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            if keys[i] == keys[j] {
                flagged.insert(ids[i].as_str());
                flagged.insert(ids[j].as_str());
            }
        }
    }

    flagged.into_iter().map(HeError::duplicate_dimension).collect()
}
