//! Disaster record rows
//!
//! A disaster record is the parent of every human-effects row. Its screens
//! live elsewhere; only the identity row is kept here so foreign keys and
//! cascading deletes have something to point at.

use crate::{ids, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DisasterRecord {
    pub id: String,
    pub created_at: chrono::NaiveDateTime,
}

/// Insert a new disaster record and return its id
pub async fn create_disaster_record(pool: &SqlitePool) -> Result<String> {
    let id = ids::generate();

    sqlx::query("INSERT INTO disaster_records (id) VALUES (?)")
        .bind(&id)
        .execute(pool)
        .await?;

    info!("Created disaster record {}", id);
    Ok(id)
}

pub async fn load_disaster_record(pool: &SqlitePool, id: &str) -> Result<Option<DisasterRecord>> {
    let record = sqlx::query_as::<_, DisasterRecord>(
        "SELECT id, created_at FROM disaster_records WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Delete a disaster record
///
/// Dependent rows go with it through `ON DELETE CASCADE`.
pub async fn delete_disaster_record(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM disaster_records WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("disaster record {}", id)));
    }

    info!("Deleted disaster record {}", id);
    Ok(())
}
