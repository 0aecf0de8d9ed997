//! Index Generator.
//!
//! Regenerates a platform's repodata by running the external indexing tool
//! (`conda index` by default) inside the platform directory.
//!
//! The generator does not discover what the tool wrote. It reports the
//! artifact names the tool is documented to produce, [`INDEX_ARTIFACTS`], and
//! those are what the mirror uploads. If a future tool version writes a
//! different set, the mirror will upload a stale or incomplete one; missing
//! names are logged after every run so the drift is visible.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::IndexerConfig;
use crate::error::{AppError, AppResult};
use crate::process::{run_bounded, ToolOutcome};

/// Files the indexing tool produces in each platform directory.
pub const INDEX_ARTIFACTS: [&str; 3] = ["repodata.json", "repodata.json.bz2", ".index.json"];

/// Index files regenerated for one platform directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexArtifacts {
    names: Vec<String>,
}

impl IndexArtifacts {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The documented artifact set.
    pub fn standard() -> Self {
        Self::new(INDEX_ARTIFACTS)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Rebuilds the index of a platform directory.
#[async_trait]
pub trait IndexGenerator: Send + Sync {
    /// Regenerate the index for `platform_dir` and report its artifacts.
    async fn reindex(&self, platform_dir: &Path) -> AppResult<IndexArtifacts>;
}

/// Runs an external indexing program such as `conda index`.
#[derive(Debug, Clone)]
pub struct CondaIndexer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CondaIndexer {
    pub fn new(config: &IndexerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    /// Resolve the program on `PATH`, if it is there.
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    fn command(&self, platform_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(platform_dir);
        cmd
    }
}

#[async_trait]
impl IndexGenerator for CondaIndexer {
    async fn reindex(&self, platform_dir: &Path) -> AppResult<IndexArtifacts> {
        let started = std::time::Instant::now();
        let outcome = run_bounded(self.command(platform_dir), self.timeout)
            .await
            .map_err(|e| {
                AppError::IndexGeneration(format!("failed to run {}: {e}", self.program))
            })?;

        let output = match outcome {
            ToolOutcome::Finished(output) => output,
            ToolOutcome::TimedOut => {
                return Err(AppError::IndexGeneration(format!(
                    "{} did not finish within {}s in {}",
                    self.program,
                    self.timeout.as_secs(),
                    platform_dir.display()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::IndexGeneration(format!(
                "{} exited with {} in {}: {}",
                self.program,
                output.status,
                platform_dir.display(),
                stderr.trim()
            )));
        }

        let artifacts = IndexArtifacts::standard();
        for name in artifacts.iter() {
            if !platform_dir.join(name).exists() {
                warn!(dir = %platform_dir.display(), artifact = name, "Indexer did not produce expected artifact");
            }
        }

        info!(
            dir = %platform_dir.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Platform reindexed"
        );
        Ok(artifacts)
    }
}
