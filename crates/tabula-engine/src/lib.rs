//! Tabula Engine - mutation-caller boundary
//!
//! Record create/update/delete commands that commit the mutation, keep the
//! master table in sync, and hand the change to the automation engine.
//! Engine behavior is read from an [`EngineConfig`].

pub mod commands;
pub mod config;

pub use commands::{apply_record_command, RecordCommand, RecordCommandResult};
pub use config::EngineConfig;
