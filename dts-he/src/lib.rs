//! dts-he: human effects rows of a disaster record
//!
//! Each effect row (deaths, injured, missing, affected, displaced,
//! displacement stocks) is stored split across the shared `human_dsg`
//! aggregate table and the effect's own table. This crate validates raw rows
//! against the field definitions, splits and writes them, reads them back
//! sorted, and flags rows whose disaggregation values collide.

pub mod db;
pub mod dedupe;
pub mod defs;
pub mod error;
pub mod split;
pub mod types;
pub mod validate;

pub use db::rows::{clear_data, create, delete_rows, get, update, validate, GetResult};
pub use db::save::{save, SaveRequest, SaveResult, UpdateBatch};
pub use defs::defs_for_table;
pub use error::{Error, HeError, HeErrorCode, Result};
pub use types::{Cell, FieldDef, FieldFormat, FieldRole, HumanEffectsTable, RawRow, Storage, Value};
