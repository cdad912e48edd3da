//! Per-job staging directory.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::JobSettings;

/// Temporary directory owned by one job.
///
/// Holds the staged configuration file and, after a successful merge, the
/// merge output directory. Removed with all contents on [`close`] or drop.
///
/// [`close`]: StagingArea::close
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    config_path: PathBuf,
    output_dir: PathBuf,
}

impl StagingArea {
    /// Create the directory and write `config` into it verbatim.
    pub async fn create(settings: &JobSettings, config: &str) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mergekit-evolve-");
        let dir = match &settings.staging_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let config_path = dir.path().join(&settings.config_file_name);
        tokio::fs::write(&config_path, config).await?;
        let output_dir = dir.path().join(&settings.output_dir_name);
        debug!("Staged configuration at {:?}", config_path);

        Ok(Self {
            dir,
            config_path,
            output_dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Where the merge command is expected to leave its output.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Remove the directory and everything in it.
    ///
    /// Merge output can be many gigabytes, so removal runs on the blocking pool.
    pub async fn close(self) -> io::Result<()> {
        tokio::task::spawn_blocking(move || self.remove())
            .await
            .map_err(io::Error::other)?
    }

    fn remove(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove staging area {:?}: {}", path, e);
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }
        Ok(())
    }
}
