//! Batch save of an editing session
//!
//! An editor submits deletes, updates and new rows together. They are
//! applied in that order on the caller's transaction, then the record is
//! checked for duplicate dimensions. Any rejection comes back as an error so
//! the caller drops the transaction and nothing is stored.

use super::rows::{create, delete_rows, update, validate};
use crate::error::{Error, Result};
use crate::types::{FieldDef, HumanEffectsTable, RawRow};
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    pub ids: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Pending changes of one table of a record
///
/// Rows are positional (see [`RawRow`]); build them from keyed objects with
/// [`crate::validate::raw_row_from_object`] so explicit nulls survive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveRequest {
    pub deletes: Vec<String>,
    pub updates: UpdateBatch,
    pub creates: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveResult {
    pub deleted: Vec<String>,
    pub updated: Vec<String>,
    pub created: Vec<String>,
}

pub async fn save(
    tx: &mut Transaction<'_, Sqlite>,
    table: HumanEffectsTable,
    record_id: &str,
    defs: &[FieldDef],
    request: &SaveRequest,
    string_mode: bool,
) -> Result<SaveResult> {
    let mut result = SaveResult::default();

    if !request.deletes.is_empty() {
        result.deleted = delete_rows(tx, table, &request.deletes).await?;
    }
    if !request.updates.ids.is_empty() || !request.updates.rows.is_empty() {
        result.updated = update(
            tx,
            table,
            defs,
            &request.updates.ids,
            &request.updates.rows,
            string_mode,
        )
        .await?;
    }
    if !request.creates.is_empty() {
        result.created = create(tx, table, record_id, defs, &request.creates, string_mode).await?;
    }

    let duplicates = validate(&mut **tx, table, record_id, defs).await?;
    if !duplicates.is_empty() {
        return Err(Error::Duplicates(duplicates));
    }

    info!(
        "Saved {} of record {}: {} deleted, {} updated, {} created",
        table,
        record_id,
        result.deleted.len(),
        result.updated.len(),
        result.created.len()
    );
    Ok(result)
}
