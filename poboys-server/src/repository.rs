//! Package repository operations.
//!
//! [`Repository`] ties the store, the index generator, the mirror and the
//! release publisher together. Every mutation follows the same protocol:
//!
//! 1. take the platform lock
//! 2. change the package set on disk
//! 3. regenerate the platform index
//! 4. push the change to the mirror, if one is configured
//!
//! If step 4 fails the local change is undone and the index regenerated
//! again, so the local directory and the bucket never disagree about which
//! packages exist. Nothing is retried.
//!
//! Deletes are staged rather than applied directly. The package is moved to
//! the staging area in step 2, put back if the mirror rejects the delete, and
//! only removed for good once the mirror has caught up.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::index::{IndexArtifacts, IndexGenerator};
use crate::locks::PlatformLocks;
use crate::mirror::MirrorSync;
use crate::platform::Platform;
use crate::release::ReleasePublisher;
use crate::store::PlatformStore;
use crate::validate_filename;

/// Package operations over every platform.
pub struct Repository {
    store: PlatformStore,
    indexer: Arc<dyn IndexGenerator>,
    mirror: MirrorSync,
    publisher: Option<Arc<dyn ReleasePublisher>>,
    locks: PlatformLocks,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.store.root())
            .field("mirror", &self.mirror)
            .field("release_enabled", &self.release_enabled())
            .finish()
    }
}

impl Repository {
    pub fn new(store: PlatformStore, indexer: Arc<dyn IndexGenerator>, mirror: MirrorSync) -> Self {
        Self {
            store,
            indexer,
            mirror,
            publisher: None,
            locks: PlatformLocks::new(),
        }
    }

    /// Enable releases through `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn ReleasePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn mirror(&self) -> &MirrorSync {
        &self.mirror
    }

    pub fn release_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    /// Create every platform directory and clear out interrupted deletes.
    pub async fn prepare_layout(&self) -> AppResult<()> {
        self.store.ensure_root_exists().await?;
        self.store.purge_staging().await?;
        for platform in Platform::ALL {
            self.store.ensure_platform_dir(platform).await?;
        }
        Ok(())
    }

    /// [`prepare_layout`](Self::prepare_layout), then reindex every platform.
    pub async fn bootstrap(&self) -> AppResult<()> {
        self.prepare_layout().await?;
        for platform in Platform::ALL {
            let _guard = self.locks.lock(platform).await;
            let dir = self.store.platform_dir(platform);
            self.indexer.reindex(&dir).await?;
        }
        info!(platforms = Platform::ALL.len(), "Initial index complete");
        Ok(())
    }

    /// Add a package to `platform`.
    ///
    /// Fails with [`AppError::Conflict`] if the name is taken. On a mirror
    /// failure the package is removed again before the error is returned.
    pub async fn upload(
        &self,
        platform: Platform,
        filename: &str,
        content: &[u8],
    ) -> AppResult<IndexArtifacts> {
        validate_filename(filename)?;
        let _guard = self.locks.lock(platform).await;

        let dir = self.store.ensure_platform_dir(platform).await?;
        self.store.save_new(&dir, filename, content).await?;

        let artifacts = match self.indexer.reindex(&dir).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                // Keep the package set in line with the last good index.
                self.discard_upload(&dir, filename).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .mirror
            .push_package(platform, filename, &dir, &artifacts)
            .await
        {
            warn!(platform = %platform, filename = %filename, error = %e, "Mirror rejected upload, rolling back");
            self.discard_upload(&dir, filename).await;
            self.reindex_after_rollback(&dir).await;
            return Err(e);
        }

        info!(
            platform = %platform,
            filename = %filename,
            size = content.len(),
            sha256 = %hex_digest(content),
            "Package uploaded"
        );
        Ok(artifacts)
    }

    /// Remove a package from `platform`. Removing an absent package succeeds.
    ///
    /// Returns whether a file was actually removed. On a mirror failure the
    /// package is restored before the error is returned.
    pub async fn delete(&self, platform: Platform, filename: &str) -> AppResult<bool> {
        validate_filename(filename)?;
        let _guard = self.locks.lock(platform).await;

        let dir = self.store.ensure_platform_dir(platform).await?;
        let staged = self.store.stage_removal(platform, &dir, filename).await?;
        let removed = staged.is_some();

        let artifacts = match self.indexer.reindex(&dir).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                if let Some(staged) = staged {
                    self.restore(staged).await;
                }
                return Err(e);
            }
        };

        if let Err(e) = self
            .mirror
            .remove_remote(platform, filename, &dir, &artifacts)
            .await
        {
            warn!(platform = %platform, filename = %filename, error = %e, "Mirror rejected delete, rolling back");
            if let Some(staged) = staged {
                self.restore(staged).await;
                self.reindex_after_rollback(&dir).await;
            }
            return Err(e);
        }

        if let Some(staged) = staged {
            if let Err(e) = staged.commit().await {
                // The package is already gone from the platform directory.
                warn!(platform = %platform, filename = %filename, error = %e, "Failed to clear staged delete");
            }
        }

        info!(platform = %platform, filename = %filename, removed, "Package deleted");
        Ok(removed)
    }

    /// Names in the packages root, sorted.
    pub async fn list_platforms(&self) -> AppResult<Vec<String>> {
        let root = self.store.ensure_root_exists().await?;
        self.store.list_entries(root).await
    }

    /// Names in one platform directory (packages and index files), sorted.
    pub async fn list_packages(&self, platform: Platform) -> AppResult<Vec<String>> {
        let dir = self.store.ensure_platform_dir(platform).await?;
        self.store.list_entries(&dir).await
    }

    /// Open a package for download.
    pub async fn download(&self, platform: Platform, filename: &str) -> AppResult<(File, u64)> {
        validate_filename(filename)?;
        let dir = self.store.ensure_platform_dir(platform).await?;
        self.store.open_file(&dir, filename).await
    }

    /// Publish a package through the configured publisher, returning its output.
    pub async fn release(&self, platform: Platform, filename: &str) -> AppResult<Vec<u8>> {
        validate_filename(filename)?;
        let dir = self.store.ensure_platform_dir(platform).await?;
        let publisher = self.publisher.as_ref().ok_or_else(|| {
            AppError::BadRequest("Releasing to anaconda.org is not configured".to_string())
        })?;

        if !self.store.contains(&dir, filename).await? {
            return Err(AppError::NotFound(format!(
                "No package {filename} for platform {platform}"
            )));
        }

        Ok(publisher.release(platform, &dir, filename).await)
    }

    async fn discard_upload(&self, dir: &Path, filename: &str) {
        if let Err(e) = self.store.remove_file(dir, filename).await {
            error!(dir = %dir.display(), filename = %filename, error = %e, "Failed to remove rolled back upload");
        }
    }

    async fn restore(&self, staged: crate::store::StagedRemoval) {
        if let Err(e) = staged.restore().await {
            error!(error = %e, "Failed to restore staged package");
        }
    }

    // Best effort; the caller sees the error that triggered the rollback.
    async fn reindex_after_rollback(&self, dir: &Path) {
        if let Err(e) = self.indexer.reindex(dir).await {
            error!(dir = %dir.display(), error = %e, "Reindex after rollback failed");
        }
    }
}

fn hex_digest(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
