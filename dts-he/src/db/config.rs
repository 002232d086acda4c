//! Tenant configuration row
//!
//! `human_dsg_config` holds a single row (id = 1) with two JSON columns:
//! - `hidden`: `{"cols": [...]}`, shared columns to leave out of forms
//! - `custom`: `{"config": [...]}`, tenant-defined enum dimensions
//!
//! A missing row or column reads as the default (nothing hidden, no custom
//! dimensions).

use crate::defs::{reserved_db_names, shared_defs_all};
use crate::error::Result;
use crate::types::{is_identifier, EnumEntry};
use dts_common::Error as CommonError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenConfig {
    #[serde(default)]
    pub cols: Vec<String>,
}

impl HiddenConfig {
    /// Only shared columns can be hidden
    pub fn validate(&self) -> dts_common::Result<()> {
        for col in &self.cols {
            if !shared_defs_all().iter().any(|d| &d.db_name == col) {
                return Err(CommonError::Config(format!(
                    "hidden column {} is not a shared column",
                    col
                )));
            }
        }
        Ok(())
    }
}

/// One tenant-defined enum dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDimension {
    pub ui_name: String,
    pub db_name: String,
    #[serde(default)]
    pub values: Vec<EnumEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomConfig {
    #[serde(default)]
    pub config: Vec<CustomDimension>,
}

impl CustomConfig {
    pub fn validate(&self) -> dts_common::Result<()> {
        for (i, dim) in self.config.iter().enumerate() {
            if !is_identifier(&dim.db_name) {
                return Err(CommonError::Config(format!(
                    "custom dimension name {:?} must be a lowercase identifier",
                    dim.db_name
                )));
            }
            if reserved_db_names().any(|n| n == dim.db_name) {
                return Err(CommonError::Config(format!(
                    "custom dimension name {} is already used by a built-in field",
                    dim.db_name
                )));
            }
            if self.config[..i].iter().any(|d| d.db_name == dim.db_name) {
                return Err(CommonError::Config(format!(
                    "custom dimension {} is defined twice",
                    dim.db_name
                )));
            }
            if dim.values.is_empty() {
                return Err(CommonError::Config(format!(
                    "custom dimension {} has no values",
                    dim.db_name
                )));
            }
            for (j, entry) in dim.values.iter().enumerate() {
                if entry.key.is_empty() {
                    return Err(CommonError::Config(format!(
                        "custom dimension {} has an empty key",
                        dim.db_name
                    )));
                }
                if dim.values[..j].iter().any(|e| e.key == entry.key) {
                    return Err(CommonError::Config(format!(
                        "custom dimension {} repeats key {}",
                        dim.db_name, entry.key
                    )));
                }
            }
        }
        Ok(())
    }
}

pub async fn load_hidden(conn: &mut SqliteConnection) -> Result<HiddenConfig> {
    load_json_column(conn, "hidden").await
}

pub async fn save_hidden(conn: &mut SqliteConnection, hidden: &HiddenConfig) -> Result<()> {
    hidden.validate()?;
    save_json_column(conn, "hidden", hidden).await?;
    info!("Saved hidden columns: {:?}", hidden.cols);
    Ok(())
}

pub async fn load_custom(conn: &mut SqliteConnection) -> Result<CustomConfig> {
    load_json_column(conn, "custom").await
}

pub async fn save_custom(conn: &mut SqliteConnection, custom: &CustomConfig) -> Result<()> {
    custom.validate()?;
    save_json_column(conn, "custom", custom).await?;
    info!("Saved {} custom dimensions", custom.config.len());
    Ok(())
}

/// Generic JSON column getter (internal)
///
/// `column` is always one of the fixed names above.
async fn load_json_column<T>(conn: &mut SqliteConnection, column: &'static str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let sql = format!("SELECT {} FROM human_dsg_config WHERE id = 1", column);
    let row: Option<(Option<String>,)> = sqlx::query_as(&sql).fetch_optional(&mut *conn).await?;

    match row {
        Some((Some(text),)) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
        _ => Ok(T::default()),
    }
}

/// Generic JSON column setter (internal)
async fn save_json_column<T>(
    conn: &mut SqliteConnection,
    column: &'static str,
    value: &T,
) -> Result<()>
where
    T: Serialize,
{
    let text = serde_json::to_string(value)?;
    let sql = format!(
        "INSERT INTO human_dsg_config (id, {col}) VALUES (1, ?)
         ON CONFLICT(id) DO UPDATE SET {col} = excluded.{col}, updated_at = CURRENT_TIMESTAMP",
        col = column
    );
    sqlx::query(&sql).bind(text).execute(&mut *conn).await?;
    Ok(())
}
