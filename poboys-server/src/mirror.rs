//! Mirror Sync.
//!
//! Keeps an object store bucket in step with the local platform directories.
//! Objects are keyed `<platform>/<filename>`, for package files and index
//! artifacts alike.
//!
//! [`MirrorSync`] reports the first failed remote call and stops there. It
//! does not clean up partial pushes; undoing the local change is left to
//! [`crate::repository`].

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, MirrorOp};
use crate::index::IndexArtifacts;
use crate::platform::Platform;

/// Minimal key/value object store used for mirroring.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;

    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

/// Remote key for a file in a platform directory.
pub fn object_key(platform: Platform, filename: &str) -> String {
    format!("{}/{}", platform.as_str(), filename)
}

#[derive(Clone)]
struct MirrorTarget {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

/// Pushes platform directory changes to the configured bucket.
///
/// With no bucket configured every operation succeeds without doing anything.
#[derive(Clone, Default)]
pub struct MirrorSync {
    target: Option<MirrorTarget>,
}

impl std::fmt::Debug for MirrorSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorSync")
            .field("bucket", &self.bucket())
            .finish()
    }
}

impl MirrorSync {
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            target: Some(MirrorTarget {
                bucket: bucket.into(),
                store,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn bucket(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.bucket.as_str())
    }

    /// Upload a package file followed by the platform's index artifacts.
    pub async fn push_package(
        &self,
        platform: Platform,
        filename: &str,
        platform_dir: &Path,
        artifacts: &IndexArtifacts,
    ) -> AppResult<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };

        let result = async {
            target.put_file(platform, platform_dir, filename).await?;
            target.put_artifacts(platform, platform_dir, artifacts).await
        }
        .await;

        result.map_err(|source| target.error(MirrorOp::Upload, source))?;
        info!(bucket = %target.bucket, platform = %platform, filename = %filename, "Package mirrored");
        Ok(())
    }

    /// Delete a package's object, then upload the regenerated index artifacts.
    ///
    /// The local index must already reflect the delete.
    pub async fn remove_remote(
        &self,
        platform: Platform,
        filename: &str,
        platform_dir: &Path,
        artifacts: &IndexArtifacts,
    ) -> AppResult<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };

        let result = async {
            let key = object_key(platform, filename);
            target
                .store
                .delete_object(&key)
                .await
                .with_context(|| format!("deleting {key}"))?;
            debug!(bucket = %target.bucket, key = %key, "Deleted remote object");
            target.put_artifacts(platform, platform_dir, artifacts).await
        }
        .await;

        result.map_err(|source| target.error(MirrorOp::Delete, source))?;
        info!(bucket = %target.bucket, platform = %platform, filename = %filename, "Package removed from mirror");
        Ok(())
    }
}

impl MirrorTarget {
    async fn put_file(&self, platform: Platform, dir: &Path, filename: &str) -> anyhow::Result<()> {
        let path = dir.join(filename);
        let body = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let key = object_key(platform, filename);
        self.store
            .put_object(&key, Bytes::from(body))
            .await
            .with_context(|| format!("uploading {key}"))?;
        debug!(bucket = %self.bucket, key = %key, "Uploaded object");
        Ok(())
    }

    async fn put_artifacts(
        &self,
        platform: Platform,
        dir: &Path,
        artifacts: &IndexArtifacts,
    ) -> anyhow::Result<()> {
        for name in artifacts.iter() {
            self.put_file(platform, dir, name).await?;
        }
        Ok(())
    }

    fn error(&self, op: MirrorOp, source: anyhow::Error) -> AppError {
        AppError::Mirror {
            op,
            bucket: self.bucket.clone(),
            source,
        }
    }
}

#[cfg(feature = "s3")]
pub use self::s3::S3ObjectStore;

#[cfg(feature = "s3")]
mod s3 {
    use anyhow::Context;
    use async_trait::async_trait;
    use aws_sdk_s3 as s3;
    use bytes::Bytes;

    use super::ObjectStore;
    use crate::config::MirrorConfig;

    /// S3 bucket accessed through the default AWS credential chain.
    #[derive(Debug, Clone)]
    pub struct S3ObjectStore {
        client: s3::Client,
        bucket: String,
    }

    impl S3ObjectStore {
        pub fn new(client: s3::Client, bucket: impl Into<String>) -> Self {
            Self {
                client,
                bucket: bucket.into(),
            }
        }

        /// Build a client from the environment, applying any region or
        /// endpoint override from `config`.
        pub async fn from_config(config: &MirrorConfig) -> anyhow::Result<Self> {
            let bucket = config
                .bucket
                .clone()
                .context("no S3 bucket configured")?;

            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(aws_config::Region::new(region.clone()));
            }
            let shared = loader.load().await;

            let mut builder = s3::config::Builder::from(&shared);
            if let Some(endpoint) = &config.endpoint {
                builder = builder.endpoint_url(endpoint).force_path_style(true);
            }

            Ok(Self::new(s3::Client::from_conf(builder.build()), bucket))
        }
    }

    #[async_trait]
    impl ObjectStore for S3ObjectStore {
        async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(s3::primitives::ByteStream::from(body))
                .content_type("application/octet-stream")
                .send()
                .await
                .context("S3 put_object failed")?;
            Ok(())
        }

        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .context("S3 delete_object failed")?;
            Ok(())
        }
    }
}
