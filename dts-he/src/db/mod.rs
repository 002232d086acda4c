//! Database access for dts-he
//!
//! Tables created here (on top of the shared `disaster_records`):
//! - `human_dsg`: one aggregate row per effect row; shared columns plus the
//!   `custom` JSON map
//! - `deaths`, `injured`, `missing`, `affected`, `displaced`,
//!   `displacement_stocks`: table-specific columns, `dsg_id` back to
//!   `human_dsg`
//! - `human_category_presence`: one row per record
//! - `human_dsg_config`: tenant configuration (single row)
//!
//! Column lists are derived from the definition catalogs, so a field added
//! to a catalog gets its column on the next start against a fresh database.

pub mod config;
pub mod presence;
pub mod rows;
pub mod save;

use crate::defs::{shared_defs_all, table_defs};
use crate::error::Result;
use crate::types::{FieldDef, FieldFormat, HumanEffectsTable};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Open the database and create every table dts-he needs
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = dts_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Private in-memory database with every table created
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = dts_common::db::init_memory_database().await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create dts-he tables if they don't exist (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS human_dsg_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            hidden TEXT,
            custom TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(&human_dsg_ddl()).execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_human_dsg_record_id ON human_dsg(record_id)")
        .execute(pool)
        .await?;

    for table in HumanEffectsTable::ALL {
        sqlx::query(&effect_table_ddl(table)).execute(pool).await?;
    }

    sqlx::query(&presence::presence_ddl()).execute(pool).await?;

    info!("Human effects tables initialized");
    Ok(())
}

/// SQLite column type for a field format
pub(crate) fn sql_type(format: FieldFormat) -> &'static str {
    match format {
        FieldFormat::Enum => "TEXT",
        FieldFormat::Number => "INTEGER",
        // ISO-8601 text keeps date ordering in SQL and in Rust identical
        FieldFormat::Date => "TEXT",
    }
}

fn column_list(defs: &[FieldDef]) -> String {
    defs.iter()
        .map(|d| format!(",\n            {} {}", d.db_name, sql_type(d.format)))
        .collect()
}

fn human_dsg_ddl() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS human_dsg (
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL REFERENCES disaster_records(id) ON DELETE CASCADE,
            custom TEXT NOT NULL DEFAULT '{{}}'{}
        )
        "#,
        column_list(shared_defs_all())
    )
}

fn effect_table_ddl(table: HumanEffectsTable) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id TEXT PRIMARY KEY,
            dsg_id TEXT NOT NULL UNIQUE REFERENCES human_dsg(id) ON DELETE CASCADE{}
        )
        "#,
        table.physical_table(),
        column_list(table_defs(table))
    )
}
