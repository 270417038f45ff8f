//! Repository layer for persisting the directory and records to SQLite

pub mod access;
mod rows;
pub mod sqlite_repo;

pub use access::SqliteAccess;
pub use sqlite_repo::SqliteRepo;
