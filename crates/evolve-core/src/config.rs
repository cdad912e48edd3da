//! Job settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Knobs that stay fixed across jobs run by one orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSettings {
    /// Prefix of generated repository names
    pub name_prefix: String,
    /// Parent directory for staging areas (system temp dir when `None`)
    pub staging_root: Option<PathBuf>,
    /// File name the configuration is written to
    pub config_file_name: String,
    /// Subdirectory the merge command writes its output into
    pub output_dir_name: String,
    /// Tag stderr lines of the merge process as ERROR instead of INFO
    pub stderr_as_error: bool,
    /// Bound on process output lines buffered between runner and log
    pub line_buffer: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            name_prefix: "mergekit-evolve".to_string(),
            staging_root: None,
            config_file_name: "config.yaml".to_string(),
            output_dir_name: "merge".to_string(),
            stderr_as_error: false,
            line_buffer: 256,
        }
    }
}

impl JobSettings {
    /// Defaults, with `EVOLVE_STAGING_DIR` setting the staging root.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(dir) = std::env::var("EVOLVE_STAGING_DIR") {
            if !dir.trim().is_empty() {
                settings.staging_root = Some(PathBuf::from(dir));
            }
        }
        settings
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }
}
