//! # Application State
//!
//! [`AppState`] is built once at startup, wrapped in an `Arc` and shared by
//! every request handler. It holds the immutable configuration and the
//! [`Repository`] that performs package operations.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::index::CondaIndexer;
use crate::mirror::MirrorSync;
use crate::release::AnacondaPublisher;
use crate::repository::Repository;
use crate::store::PlatformStore;

/// Shared state for all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Repository,
}

impl AppState {
    pub fn new(config: Arc<Config>, repo: Repository) -> Self {
        Self { config, repo }
    }

    /// Wire the production collaborators described by `config`.
    pub async fn from_config(config: Arc<Config>) -> Result<Self> {
        let store = PlatformStore::new(config.pkgs_dir(), config.staging_dir());

        let indexer = CondaIndexer::new(&config.indexer);
        match indexer.locate() {
            Some(path) => info!(indexer = %path.display(), "Using index tool"),
            None => warn!(
                program = %config.indexer.program,
                "Index tool not found on PATH; uploads and deletes will fail"
            ),
        }

        let mirror = build_mirror(&config).await?;
        let mut repo = Repository::new(store, Arc::new(indexer), mirror);

        if let Some(publisher) = AnacondaPublisher::from_config(&config.release) {
            info!(program = %config.release.program, "Release to anaconda.org enabled");
            repo = repo.with_publisher(Arc::new(publisher));
        }

        Ok(Self::new(config, repo))
    }
}

#[cfg(feature = "s3")]
async fn build_mirror(config: &Config) -> Result<MirrorSync> {
    use anyhow::Context;

    let Some(bucket) = config.mirror.bucket.clone() else {
        return Ok(MirrorSync::disabled());
    };
    let store = crate::mirror::S3ObjectStore::from_config(&config.mirror)
        .await
        .with_context(|| format!("Failed to set up S3 client for bucket {bucket}"))?;
    info!(bucket = %bucket, "Mirroring packages to S3");
    Ok(MirrorSync::new(bucket, Arc::new(store)))
}

#[cfg(not(feature = "s3"))]
async fn build_mirror(config: &Config) -> Result<MirrorSync> {
    if let Some(bucket) = &config.mirror.bucket {
        anyhow::bail!("S3 bucket {bucket} configured but this build has no s3 support");
    }
    Ok(MirrorSync::disabled())
}
