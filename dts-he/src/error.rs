//! Error types for dts-he
//!
//! Two families live side by side:
//! - [`HeError`]: expected domain rejections (bad cell, duplicate
//!   dimensions, unknown row id) meant to be shown to the person editing.
//! - [`Error`]: everything else. Database and configuration failures, plus
//!   defects such as an unknown table name or a malformed field definition.
//!   A rejection travels as [`Error::Rejected`] / [`Error::Duplicates`] so `?`
//!   propagates it and the caller's transaction rolls back.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Domain rejection codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeErrorCode {
    /// A cell failed type, format or enum validation
    InvalidValue,
    /// Two rows of one record share every dimension value
    DuplicateDimension,
    /// Structural problem: length mismatch, unknown row id
    Other,
}

impl HeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeErrorCode::InvalidValue => "invalid_value",
            HeErrorCode::DuplicateDimension => "duplicate_dimension",
            HeErrorCode::Other => "other",
        }
    }
}

impl fmt::Display for HeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain rejection surfaced to the editing layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeError {
    pub code: HeErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
}

impl HeError {
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self {
            code: HeErrorCode::InvalidValue,
            message: message.into(),
            row_id: None,
        }
    }

    pub fn duplicate_dimension(row_id: impl Into<String>) -> Self {
        Self {
            code: HeErrorCode::DuplicateDimension,
            message: "Two or more rows have the same disaggregation values.".to_string(),
            row_id: Some(row_id.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: HeErrorCode::Other,
            message: message.into(),
            row_id: None,
        }
    }

    pub fn with_row_id(mut self, row_id: impl Into<String>) -> Self {
        self.row_id = Some(row_id.into());
        self
    }
}

impl fmt::Display for HeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.row_id {
            Some(id) => write!(f, "{} (row {}): {}", self.code, id, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for HeError {}

/// Main error type for dts-he
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// dts-common error (configuration, io)
    #[error("Common error: {0}")]
    Common(#[from] dts_common::Error),

    /// JSON column could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Row data rejected by validation or lookup
    #[error("Rejected: {0}")]
    Rejected(HeError),

    /// Duplicate dimension combinations found after a save
    #[error("Rejected: {} rows share disaggregation values", .0.len())]
    Duplicates(Vec<HeError>),

    /// Table identifier outside the six effect tables
    #[error("Unknown human effects table: {0}")]
    UnknownTable(String),

    /// Field definition the operation cannot handle
    #[error("Unsupported field: {0}")]
    UnsupportedField(String),

    /// Field definition unusable as a column (bad identifier, bad enum)
    #[error("Invalid field definition: {0}")]
    InvalidDefinition(String),
}

impl Error {
    /// Domain rejections, if this error is one
    pub fn rejections(&self) -> Option<Vec<&HeError>> {
        match self {
            Error::Rejected(e) => Some(vec![e]),
            Error::Duplicates(errors) => Some(errors.iter().collect()),
            _ => None,
        }
    }

    /// True for expected domain rejections, false for defects and I/O
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected(_) | Error::Duplicates(_))
    }
}

impl From<HeError> for Error {
    fn from(e: HeError) -> Self {
        Error::Rejected(e)
    }
}

/// Convenience Result type using dts-he Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_serializes_snake_case() {
        let json = serde_json::to_string(&HeErrorCode::DuplicateDimension).unwrap();
        assert_eq!(json, "\"duplicate_dimension\"");
    }

    #[test]
    fn test_he_error_json_shape() {
        let err = HeError::duplicate_dimension("abc");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "duplicate_dimension");
        assert_eq!(json["rowId"], "abc");

        let err = HeError::other("boom");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("rowId").is_none());
    }

    #[test]
    fn test_rejection_classification() {
        let rejected: Error = HeError::invalid_value("bad").into();
        assert!(rejected.is_rejection());
        assert_eq!(rejected.rejections().unwrap().len(), 1);

        let defect = Error::UnknownTable("floods".to_string());
        assert!(!defect.is_rejection());
        assert!(defect.rejections().is_none());
    }
}
