//! Row identifiers

use uuid::Uuid;

/// Generate a new row identifier (UUIDv4, hyphenated text form)
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}
