//! Database pool initialization and shared tables

pub mod init;
pub mod records;

pub use init::*;
pub use records::*;
