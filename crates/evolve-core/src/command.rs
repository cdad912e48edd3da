//! The external merge command line.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default executable name.
pub const DEFAULT_PROGRAM: &str = "mergekit-evolve";

/// Evaluation scheduling strategies understood by `mergekit-evolve`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// --strategy pool
    #[default]
    Pool,

    /// --strategy buffered
    Buffered,

    /// --strategy serial
    Serial,
}

impl MergeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            MergeStrategy::Pool => "pool",
            MergeStrategy::Buffered => "buffered",
            MergeStrategy::Serial => "serial",
        }
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pool" => Ok(MergeStrategy::Pool),
            "buffered" => Ok(MergeStrategy::Buffered),
            "serial" => Ok(MergeStrategy::Serial),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

/// Weights & Biases experiment tracking flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WandbTracking {
    pub project: String,
    pub entity: String,
}

impl Default for WandbTracking {
    fn default() -> Self {
        Self {
            project: "mergekit-evolve".to_string(),
            entity: "arcee-ai".to_string(),
        }
    }
}

/// Fixed part of the merge invocation.
///
/// The per-job part (`--storage-path <dir> <config>`) is appended by
/// [`MergeCommand::argv`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeCommand {
    pub program: String,
    pub strategy: MergeStrategy,
    /// `None` disables `--wandb`
    pub tracking: Option<WandbTracking>,
}

impl Default for MergeCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            strategy: MergeStrategy::default(),
            tracking: Some(WandbTracking::default()),
        }
    }
}

impl MergeCommand {
    /// Default command, with `MERGEKIT_EVOLVE_BIN` overriding the program.
    pub fn from_env() -> Self {
        let mut command = Self::default();
        if let Ok(program) = std::env::var("MERGEKIT_EVOLVE_BIN") {
            if !program.trim().is_empty() {
                command.program = program;
            }
        }
        command
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn without_tracking(mut self) -> Self {
        self.tracking = None;
        self
    }

    /// Full argument vector, program first.
    pub fn argv(&self, storage_path: &Path, config_path: &Path) -> Vec<String> {
        let mut argv = vec![
            self.program.clone(),
            "--strategy".to_string(),
            self.strategy.name().to_string(),
        ];
        if let Some(tracking) = &self.tracking {
            argv.extend([
                "--wandb".to_string(),
                "--wandb-project".to_string(),
                tracking.project.clone(),
                "--wandb-entity".to_string(),
                tracking.entity.clone(),
            ]);
        }
        argv.extend([
            "--storage-path".to_string(),
            storage_path.to_string_lossy().into_owned(),
            config_path.to_string_lossy().into_owned(),
        ]);
        argv
    }
}
