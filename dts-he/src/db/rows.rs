//! Effect row create / update / delete / get
//!
//! Every effect row lives in two physical rows joined 1:1:
//! - `human_dsg` (id = dsg id): record id, custom JSON map, shared columns
//! - the effect table: own id, `dsg_id`, table-specific columns
//!
//! Write paths take the caller's transaction and never begin or commit. The
//! aggregate row is inserted before its table row and deleted after it.
//! Row loops stop at the first rejection; the caller rolls back by dropping
//! the transaction.

use crate::dedupe::find_duplicates;
use crate::error::{Error, HeError, Result};
use crate::split::{split_defs, split_row, SplitRow};
use crate::types::{
    check_defs, Cell, FieldDef, FieldFormat, HumanEffectsTable, RawRow, Storage, Value,
    DATE_FORMAT,
};
use crate::validate::validate_row;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Rows of one record, reassembled in definition order and sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetResult {
    pub defs: Vec<FieldDef>,
    pub ids: Vec<String>,
    /// `data[i][j]` is the value of `defs[j]` in row `ids[i]`
    pub data: Vec<Vec<Option<Value>>>,
}

impl GetResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Row values by row id
    pub fn row(&self, id: &str) -> Option<&[Option<Value>]> {
        self.ids
            .iter()
            .position(|i| i == id)
            .map(|pos| self.data[pos].as_slice())
    }
}

/// Insert new rows under `record_id`, returning their ids in input order
pub async fn create(
    tx: &mut Transaction<'_, Sqlite>,
    table: HumanEffectsTable,
    record_id: &str,
    defs: &[FieldDef],
    rows: &[RawRow],
    string_mode: bool,
) -> Result<Vec<String>> {
    check_defs(defs)?;
    let split = split_defs(defs);
    let dsg_sql = insert_sql("human_dsg", &["id", "record_id", "custom"], &split.shared);
    let table_sql = insert_sql(table.physical_table(), &["id", "dsg_id"], &split.not_shared);

    let mut ids = Vec::with_capacity(rows.len());
    for (index, raw) in rows.iter().enumerate() {
        let cells = validate_row(defs, raw, string_mode, false)
            .map_err(|e| rejected(table, index, e))?;
        let row = split_row(cells);

        let dsg_id = dts_common::ids::generate();
        let mut custom = Map::new();
        merge_custom(&mut custom, &row);

        let mut query = sqlx::query(&dsg_sql)
            .bind(dsg_id.clone())
            .bind(record_id)
            .bind(serde_json::to_string(&custom)?);
        for cell in &row.shared {
            query = bind_value(query, cell.cell.value());
        }
        query.execute(&mut **tx).await?;

        let id = dts_common::ids::generate();
        let mut query = sqlx::query(&table_sql)
            .bind(id.clone())
            .bind(dsg_id.clone());
        for cell in &row.not_shared {
            query = bind_value(query, cell.cell.value());
        }
        query.execute(&mut **tx).await?;

        debug!("Created {} row {} (dsg {})", table, id, dsg_id);
        ids.push(id);
    }

    info!("Created {} {} rows for record {}", ids.len(), table, record_id);
    Ok(ids)
}

/// Update rows in place; omitted fields keep their stored value
///
/// `ids[i]` is updated with `rows[i]`. Custom entries are merged into the
/// stored JSON map: a value sets its key, a null removes it.
pub async fn update(
    tx: &mut Transaction<'_, Sqlite>,
    table: HumanEffectsTable,
    defs: &[FieldDef],
    ids: &[String],
    rows: &[RawRow],
    string_mode: bool,
) -> Result<Vec<String>> {
    check_defs(defs)?;
    if ids.len() != rows.len() {
        let message = format!("Got {} ids but {} rows", ids.len(), rows.len());
        return Err(HeError::other(message).into());
    }

    for (index, (id, raw)) in ids.iter().zip(rows).enumerate() {
        let cells = validate_row(defs, raw, string_mode, true)
            .map_err(|e| rejected(table, index, e.with_row_id(id.as_str())))?;
        let row = split_row(cells);
        let dsg_id = lookup_dsg_id(&mut **tx, table, id).await?;

        let custom = if row.has_custom_input() {
            let mut stored = load_custom_map(&mut **tx, &dsg_id).await?;
            merge_custom(&mut stored, &row);
            Some(serde_json::to_string(&stored)?)
        } else {
            None
        };

        let shared: Vec<_> = row.supplied_shared().collect();
        if !shared.is_empty() || custom.is_some() {
            let mut assignments: Vec<String> =
                shared.iter().map(|c| format!("{} = ?", c.db_name)).collect();
            if custom.is_some() {
                assignments.push("custom = ?".to_string());
            }
            let sql = format!("UPDATE human_dsg SET {} WHERE id = ?", assignments.join(", "));

            let mut query = sqlx::query(&sql);
            for cell in &shared {
                query = bind_value(query, cell.cell.value());
            }
            if let Some(text) = custom {
                query = query.bind(text);
            }
            query.bind(dsg_id.as_str()).execute(&mut **tx).await?;
        }

        let not_shared: Vec<_> = row.supplied_not_shared().collect();
        if !not_shared.is_empty() {
            let assignments: Vec<String> =
                not_shared.iter().map(|c| format!("{} = ?", c.db_name)).collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                table.physical_table(),
                assignments.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for cell in &not_shared {
                query = bind_value(query, cell.cell.value());
            }
            query.bind(id.as_str()).execute(&mut **tx).await?;
        }

        debug!("Updated {} row {}", table, id);
    }

    info!("Updated {} {} rows", ids.len(), table);
    Ok(ids.to_vec())
}

/// Delete rows: table row first, then its aggregate row
pub async fn delete_rows(
    tx: &mut Transaction<'_, Sqlite>,
    table: HumanEffectsTable,
    ids: &[String],
) -> Result<Vec<String>> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table.physical_table());

    for id in ids {
        let dsg_id = lookup_dsg_id(&mut **tx, table, id).await?;

        sqlx::query(&sql)
            .bind(id.as_str())
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM human_dsg WHERE id = ?")
            .bind(dsg_id.as_str())
            .execute(&mut **tx)
            .await?;

        debug!("Deleted {} row {} (dsg {})", table, id, dsg_id);
    }

    info!("Deleted {} {} rows", ids.len(), table);
    Ok(ids.to_vec())
}

/// Delete every row of `table` under `record_id`
pub async fn clear_data(
    tx: &mut Transaction<'_, Sqlite>,
    table: HumanEffectsTable,
    record_id: &str,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT t.id FROM {} t JOIN human_dsg d ON d.id = t.dsg_id \
         WHERE d.record_id = ? ORDER BY t.id",
        table.physical_table()
    );
    let ids: Vec<String> = sqlx::query_scalar(&sql)
        .bind(record_id)
        .fetch_all(&mut **tx)
        .await?;

    delete_rows(tx, table, &ids).await
}

/// Clear all six tables and the category presence row of a record
///
/// Returns the number of effect rows removed.
pub async fn clear_record(tx: &mut Transaction<'_, Sqlite>, record_id: &str) -> Result<usize> {
    let mut removed = 0;
    for table in HumanEffectsTable::ALL {
        removed += clear_data(tx, table, record_id).await?.len();
    }

    // Aggregate rows whose table row went missing outside this module
    sqlx::query("DELETE FROM human_dsg WHERE record_id = ?")
        .bind(record_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM human_category_presence WHERE record_id = ?")
        .bind(record_id)
        .execute(&mut **tx)
        .await?;

    info!("Cleared record {} ({} rows)", record_id, removed);
    Ok(removed)
}

/// Load the rows of a record, sorted by value
///
/// Columns are compared left to right in definition order, null before any
/// value; ties keep row id order.
pub async fn get(
    conn: &mut SqliteConnection,
    table: HumanEffectsTable,
    record_id: &str,
    defs: &[FieldDef],
) -> Result<GetResult> {
    check_defs(defs)?;

    let mut columns = vec!["t.id".to_string(), "d.custom".to_string()];
    for def in defs {
        match def.storage {
            Storage::Shared => columns.push(format!("d.{}", def.db_name)),
            Storage::Table => columns.push(format!("t.{}", def.db_name)),
            Storage::Custom => {}
        }
    }
    let sql = format!(
        "SELECT {} FROM {} t JOIN human_dsg d ON d.id = t.dsg_id \
         WHERE d.record_id = ? ORDER BY t.id",
        columns.join(", "),
        table.physical_table()
    );

    let rows = sqlx::query(&sql)
        .bind(record_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        decoded.push(decode_row(row, defs)?);
    }
    decoded.sort_by(|a, b| a.1.cmp(&b.1));

    let (ids, data) = decoded.into_iter().unzip();
    Ok(GetResult {
        defs: defs.to_vec(),
        ids,
        data,
    })
}

/// Duplicate dimension check over all rows of a record
///
/// An empty list means the record is valid.
pub async fn validate(
    conn: &mut SqliteConnection,
    table: HumanEffectsTable,
    record_id: &str,
    defs: &[FieldDef],
) -> Result<Vec<HeError>> {
    let current = get(conn, table, record_id, defs).await?;
    let errors = find_duplicates(&current.defs, &current.ids, &current.data);
    if !errors.is_empty() {
        warn!(
            "{} {} rows of record {} share disaggregation values",
            errors.len(),
            table,
            record_id
        );
    }
    Ok(errors)
}

/// Number of rows of `table` under `record_id`
pub async fn count_rows(
    conn: &mut SqliteConnection,
    table: HumanEffectsTable,
    record_id: &str,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} t JOIN human_dsg d ON d.id = t.dsg_id WHERE d.record_id = ?",
        table.physical_table()
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(record_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

fn rejected(table: HumanEffectsTable, index: usize, error: HeError) -> Error {
    warn!("Rejected {} row {}: {}", table, index, error);
    Error::Rejected(error)
}

fn insert_sql(table: &str, fixed: &[&str], defs: &[FieldDef]) -> String {
    let columns: Vec<&str> = fixed
        .iter()
        .copied()
        .chain(defs.iter().map(|d| d.db_name.as_str()))
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: Option<&Value>) -> SqliteQuery<'q> {
    match value {
        None => query.bind(None::<String>),
        Some(Value::Enum(key)) => query.bind(key.clone()),
        Some(Value::Number(n)) => query.bind(*n),
        Some(Value::Date(d)) => query.bind(d.format(DATE_FORMAT).to_string()),
    }
}

async fn lookup_dsg_id(
    conn: &mut SqliteConnection,
    table: HumanEffectsTable,
    id: &str,
) -> Result<String> {
    let sql = format!("SELECT dsg_id FROM {} WHERE id = ?", table.physical_table());
    let dsg_id: Option<String> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    dsg_id.ok_or_else(|| {
        warn!("{} row {} not found", table, id);
        HeError::other(format!("Record not found for id: {}", id))
            .with_row_id(id)
            .into()
    })
}

async fn load_custom_map(conn: &mut SqliteConnection, dsg_id: &str) -> Result<Map<String, Json>> {
    let text: Option<String> = sqlx::query_scalar("SELECT custom FROM human_dsg WHERE id = ?")
        .bind(dsg_id)
        .fetch_one(&mut *conn)
        .await?;
    parse_custom(text.as_deref())
}

fn parse_custom(text: Option<&str>) -> Result<Map<String, Json>> {
    match text.map(str::trim) {
        None | Some("") => Ok(Map::new()),
        Some(text) => match serde_json::from_str::<Json>(text)? {
            Json::Object(map) => Ok(map),
            Json::Null => Ok(Map::new()),
            other => {
                let message = format!("custom column holds {} instead of an object", other);
                Err(dts_common::Error::Internal(message).into())
            }
        },
    }
}

/// Apply supplied custom cells: values set, nulls remove, unset skipped
fn merge_custom(map: &mut Map<String, Json>, row: &SplitRow) {
    for (name, cell) in &row.custom {
        match cell {
            Cell::Unset => {}
            Cell::Null => {
                map.remove(name);
            }
            Cell::Value(v) => {
                map.insert(name.clone(), v.to_json());
            }
        }
    }
}

fn decode_row(row: &SqliteRow, defs: &[FieldDef]) -> Result<(String, Vec<Option<Value>>)> {
    let id: String = row.try_get(0)?;
    let custom_text: Option<String> = row.try_get(1)?;
    let custom = parse_custom(custom_text.as_deref())?;

    let mut column = 2;
    let mut values = Vec::with_capacity(defs.len());
    for def in defs {
        let value = if def.storage == Storage::Custom {
            custom
                .get(&def.db_name)
                .map(|v| decode_json(def, v))
                .transpose()?
                .flatten()
        } else {
            let value = decode_column(row, column, def)?;
            column += 1;
            value
        };
        values.push(value);
    }
    Ok((id, values))
}

fn decode_column(row: &SqliteRow, index: usize, def: &FieldDef) -> Result<Option<Value>> {
    match def.format {
        FieldFormat::Number => Ok(row.try_get::<Option<i64>, _>(index)?.map(Value::Number)),
        FieldFormat::Enum => Ok(row.try_get::<Option<String>, _>(index)?.map(Value::Enum)),
        FieldFormat::Date => row
            .try_get::<Option<String>, _>(index)?
            .map(|text| parse_stored_date(def, &text))
            .transpose(),
    }
}

fn decode_json(def: &FieldDef, value: &Json) -> Result<Option<Value>> {
    match (def.format, value) {
        (_, Json::Null) => Ok(None),
        (FieldFormat::Enum, Json::String(key)) => Ok(Some(Value::Enum(key.clone()))),
        (FieldFormat::Number, Json::Number(n)) => Ok(n.as_i64().map(Value::Number)),
        (FieldFormat::Date, Json::String(text)) => parse_stored_date(def, text).map(Some),
        (_, other) => {
            let message = format!(
                "custom value {} of {} does not match its {:?} format",
                other, def.db_name, def.format
            );
            Err(dts_common::Error::Internal(message).into())
        }
    }
}

fn parse_stored_date(def: &FieldDef, text: &str) -> Result<Value> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map(Value::Date)
        .map_err(|e| {
            let message = format!("stored date {:?} of {}: {}", text, def.db_name, e);
            dts_common::Error::Internal(message).into()
        })
}
