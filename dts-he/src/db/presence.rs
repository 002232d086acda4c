//! Category presence flags
//!
//! One `human_category_presence` row per record tells whether each metric
//! was deliberately tracked (`true`), marked not applicable (`false`) or
//! never answered (`NULL`). Deaths, Injured and Missing columns are
//! unprefixed; the other tables prefix their metric names.

use crate::defs::table_defs;
use crate::error::{Error, HeError, Result};
use crate::types::{check_defs, FieldDef, HumanEffectsTable};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Presence flags keyed by metric `jsName`
pub type PresenceMap = BTreeMap<String, Option<bool>>;

/// Presence column of a metric definition
pub fn presence_column(table: HumanEffectsTable, def: &FieldDef) -> Result<String> {
    if def.is_custom() {
        return Err(Error::UnsupportedField(format!(
            "custom metric {} has no presence column",
            def.db_name
        )));
    }
    Ok(format!("{}{}", table.presence_prefix(), def.db_name))
}

pub(crate) fn presence_ddl() -> String {
    let mut columns = String::new();
    for table in HumanEffectsTable::ALL {
        for def in table_defs(table).iter().filter(|d| d.is_metric()) {
            let column = format!("{}{}", table.presence_prefix(), def.db_name);
            columns.push_str(&format!("\n            {} INTEGER,", column));
        }
    }

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS human_category_presence (
            record_id TEXT PRIMARY KEY REFERENCES disaster_records(id) ON DELETE CASCADE,{}
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        columns
    )
}

/// Metric definitions with their presence columns
fn metric_columns(
    table: HumanEffectsTable,
    defs: &[FieldDef],
) -> Result<Vec<(&FieldDef, String)>> {
    check_defs(defs)?;
    defs.iter()
        .filter(|d| d.is_metric())
        .map(|d| presence_column(table, d).map(|col| (d, col)))
        .collect()
}

/// Presence flags of the table's metrics; all `None` when nothing was saved
pub async fn category_presence_get(
    conn: &mut SqliteConnection,
    record_id: &str,
    table: HumanEffectsTable,
    defs: &[FieldDef],
) -> Result<PresenceMap> {
    let metrics = metric_columns(table, defs)?;
    if metrics.is_empty() {
        return Ok(PresenceMap::new());
    }

    let columns: Vec<&str> = metrics.iter().map(|(_, col)| col.as_str()).collect();
    let sql = format!(
        "SELECT {} FROM human_category_presence WHERE record_id = ?",
        columns.join(", ")
    );
    let row: Option<SqliteRow> = sqlx::query(&sql)
        .bind(record_id)
        .fetch_optional(&mut *conn)
        .await?;

    let mut result = PresenceMap::new();
    for (index, (def, _)) in metrics.iter().enumerate() {
        let flag = match &row {
            Some(row) => row.try_get::<Option<bool>, _>(index)?,
            None => None,
        };
        result.insert(def.js_name.clone(), flag);
    }
    Ok(result)
}

/// Upsert presence flags; keys not in `data` keep their stored value
///
/// A key that names no metric of the table is rejected.
pub async fn category_presence_set(
    tx: &mut Transaction<'_, Sqlite>,
    record_id: &str,
    table: HumanEffectsTable,
    defs: &[FieldDef],
    data: &PresenceMap,
) -> Result<()> {
    let metrics = metric_columns(table, defs)?;

    let mut updates = Vec::with_capacity(data.len());
    for (key, flag) in data {
        let column = metrics
            .iter()
            .find(|(def, _)| &def.js_name == key)
            .map(|(_, col)| col.as_str())
            .ok_or_else(|| {
                warn!("Presence key {} is not a {} metric", key, table);
                HeError::other(format!("Unknown metric for {}: {}", table, key))
            })?;
        updates.push((column, *flag));
    }
    if updates.is_empty() {
        return Ok(());
    }

    let columns: Vec<&str> = updates.iter().map(|(col, _)| *col).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let assignments: Vec<String> = columns
        .iter()
        .map(|col| format!("{col} = excluded.{col}"))
        .collect();
    let sql = format!(
        "INSERT INTO human_category_presence (record_id, {}) VALUES (?, {})
         ON CONFLICT(record_id) DO UPDATE SET {}, updated_at = CURRENT_TIMESTAMP",
        columns.join(", "),
        placeholders,
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql).bind(record_id);
    for (_, flag) in &updates {
        query = query.bind(*flag);
    }
    query.execute(&mut **tx).await?;

    info!(
        "Saved {} presence flags for {} of record {}",
        updates.len(),
        table,
        record_id
    );
    Ok(())
}
