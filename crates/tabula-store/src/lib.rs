//! Tabula Store - SQLite persistence for bases, tables, fields, records and rules
//!
//! Provides:
//! - SQLite schema with a checksummed migrations framework
//! - Repository writes for the directory entities (`SqliteRepo`)
//! - `SqliteAccess`, the SQLite implementation of `tabula_core::DataAccess`

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use errors::Result;
pub use repo::{SqliteAccess, SqliteRepo};
