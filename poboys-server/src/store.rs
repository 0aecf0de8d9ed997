//! Platform Directory Store.
//!
//! Packages are plain files: `<root>/<platform>/<filename>`. All filesystem
//! access made on behalf of a request goes through [`PlatformStore`], so the
//! orchestration in [`crate::repository`] never touches paths directly.
//!
//! Deletes are staged: the package is moved into
//! `<staging>/<platform>/<filename>` and only removed for good once the
//! mirror has accepted the change (see [`StagedRemoval`]).

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::platform::Platform;

/// Filesystem-backed store of package files grouped by platform.
#[derive(Debug, Clone)]
pub struct PlatformStore {
    root: PathBuf,
    staging: PathBuf,
}

impl PlatformStore {
    pub fn new(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a platform directory, whether or not it exists yet.
    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.root.join(platform.as_str())
    }

    /// Create the packages root if it is missing.
    ///
    /// Fails only when the path exists and is not a directory.
    pub async fn ensure_root_exists(&self) -> AppResult<&Path> {
        ensure_dir(&self.root).await?;
        Ok(&self.root)
    }

    /// Create the directory for `platform` if it is missing. Idempotent.
    pub async fn ensure_platform_dir(&self, platform: Platform) -> AppResult<PathBuf> {
        self.ensure_root_exists().await?;
        let dir = self.platform_dir(platform);
        ensure_dir(&dir).await?;
        Ok(dir)
    }

    /// Names of every entry in `dir`, sorted lexicographically.
    pub async fn list_entries(&self, dir: &Path) -> AppResult<Vec<String>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Whether `filename` exists as a regular file in `dir`.
    pub async fn contains(&self, dir: &Path, filename: &str) -> AppResult<bool> {
        match fs::metadata(dir.join(filename)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a new package file. Never overwrites.
    ///
    /// Returns [`AppError::Conflict`] when a file of that name already exists.
    /// A partially written file is removed before the write error is returned.
    pub async fn save_new(&self, dir: &Path, filename: &str, content: &[u8]) -> AppResult<PathBuf> {
        let path = dir.join(filename);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(path = %path.display(), "Refusing to overwrite existing package");
                return Err(AppError::Conflict(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = async {
            file.write_all(content).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove partial upload");
            }
            return Err(e.into());
        }

        info!(path = %path.display(), size = content.len(), "Package saved");
        Ok(path)
    }

    /// Open a package for download, returning the handle and its length.
    pub async fn open_file(&self, dir: &Path, filename: &str) -> AppResult<(fs::File, u64)> {
        let path = dir.join(filename);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("File not found: {filename}")));
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(AppError::NotFound(format!("File not found: {filename}")));
        }
        Ok((file, meta.len()))
    }

    /// Delete a file. An already absent file counts as success.
    ///
    /// Returns whether a file was actually removed.
    pub async fn remove_file(&self, dir: &Path, filename: &str) -> AppResult<bool> {
        let path = dir.join(filename);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed file");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a package out of its platform directory into the staging area.
    ///
    /// Returns `None` when there was nothing to remove.
    pub async fn stage_removal(
        &self,
        platform: Platform,
        dir: &Path,
        filename: &str,
    ) -> AppResult<Option<StagedRemoval>> {
        let original = dir.join(filename);
        let staging_dir = self.staging.join(platform.as_str());
        ensure_dir(&staging_dir).await?;
        let staged = staging_dir.join(filename);

        // A leftover from an interrupted delete would block the rename on some platforms.
        if let Err(e) = fs::remove_file(&staged).await {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        match fs::rename(&original, &staged).await {
            Ok(()) => {
                debug!(from = %original.display(), to = %staged.display(), "Staged package removal");
                Ok(Some(StagedRemoval { original, staged }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop anything left in the staging area by an interrupted delete.
    ///
    /// By the time a file is staged its platform index no longer lists it, so
    /// leftovers are finished deletes.
    pub async fn purge_staging(&self) -> AppResult<usize> {
        let mut purged = 0;
        for platform in Platform::ALL {
            let dir = self.staging.join(platform.as_str());
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                fs::remove_file(entry.path()).await?;
                purged += 1;
            }
        }
        if purged > 0 {
            info!(count = purged, "Purged staged deletes left by a previous run");
        }
        Ok(purged)
    }
}

/// A package moved aside by [`PlatformStore::stage_removal`].
///
/// Exactly one of [`restore`](Self::restore) or [`commit`](Self::commit)
/// should be called.
#[derive(Debug)]
#[must_use = "a staged removal must be restored or committed"]
pub struct StagedRemoval {
    original: PathBuf,
    staged: PathBuf,
}

impl StagedRemoval {
    /// Put the package back where it was.
    pub async fn restore(self) -> AppResult<()> {
        fs::rename(&self.staged, &self.original).await?;
        info!(path = %self.original.display(), "Restored staged package");
        Ok(())
    }

    /// Delete the staged copy for good.
    pub async fn commit(self) -> AppResult<()> {
        match fs::remove_file(&self.staged).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn ensure_dir(path: &Path) -> AppResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(AppError::Storage(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", path.display()),
            )));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = fs::create_dir_all(path).await {
        // Lost a race with another request creating the same directory.
        let raced = fs::metadata(path).await.is_ok_and(|m| m.is_dir());
        if !raced {
            return Err(e.into());
        }
    }
    debug!(dir = %path.display(), "Ensured directory");
    Ok(())
}
