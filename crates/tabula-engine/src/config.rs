//! Engine configuration, loaded from TOML
//!
//! Every key is optional:
//!
//! ```toml
//! logging_profile = "production"
//! automation_enabled = true
//! direct_sync_enabled = true
//! max_cascade_depth = 3
//! reversal_enabled = true
//! ```

#![allow(clippy::result_large_err)]

use std::path::Path;

use serde::Deserialize;
use tabula_core::automation::{AutomationOptions, DEFAULT_MAX_CASCADE_DEPTH};
use tabula_core::errors::{ExError, ExErrorKind};
use tabula_core::logging_facility::Profile;
use tabula_store::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Handed by the host to `tabula_core::logging_facility::init` at startup
    pub logging_profile: Profile,
    /// Run rule matching after each committed mutation
    pub automation_enabled: bool,
    /// Run the direct-path master sync after each committed mutation
    pub direct_sync_enabled: bool,
    /// Cascade re-entry bound; 0 disables cascades
    pub max_cascade_depth: usize,
    pub reversal_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logging_profile: Profile::default(),
            automation_enabled: true,
            direct_sync_enabled: true,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            reversal_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// `InvalidInput` for malformed TOML, unknown keys or mistyped values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| {
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("config_parse")
                .with_message(e.to_string())
        })
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, otherwise as [`EngineConfig::from_toml_str`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("config_read")
                .with_message(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn automation_options(&self) -> AutomationOptions {
        AutomationOptions {
            max_cascade_depth: self.max_cascade_depth,
            reversal_enabled: self.reversal_enabled,
        }
    }
}
