//! # DTS Common Library
//!
//! Shared code for the disaster tracking tools including:
//! - Bootstrap configuration (root folder, TOML file, logging)
//! - Database pool initialization
//! - Disaster record rows (the parent of every human-effects row)
//! - Row identifier generation

pub mod config;
pub mod db;
pub mod error;
pub mod ids;

pub use error::{Error, Result};
