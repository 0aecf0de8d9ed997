//! # Configuration Management
//!
//! Server configuration is read once at startup and never changes afterwards.
//! It is assembled from three layers, later layers winning:
//!
//! 1. built-in defaults ([`Config::default`])
//! 2. an optional JSON file ([`Config::load`])
//! 3. command line flags (see [`crate::cli`])
//!
//! The resulting [`Config`] is wrapped in an `Arc` and handed to every
//! component explicitly.
//!
//! ```rust,no_run
//! # use poboys_server::config::Config;
//! let config = Config::load_or_default("poboys.json")?;
//! assert!(config.port > 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_PORT: u16 = 6969;
pub const DEFAULT_PREFIX: &str = "/poboys";

/// First path segments already served at the root.
const RESERVED_PREFIXES: [&str; 5] = ["upload", "pkgs", "delete", "anaconda", "health"];

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding `pkgs/` and the delete staging area
    pub data_dir: PathBuf,
    /// URL prefix the pages are served under in addition to `/`
    pub prefix: String,
    pub mirror: MirrorConfig,
    pub indexer: IndexerConfig,
    pub release: ReleaseConfig,
    pub limits: LimitsConfig,
    /// Create and reindex every platform directory before accepting requests
    pub reindex_on_startup: bool,
}

/// Object store mirroring. Disabled unless `bucket` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub bucket: Option<String>,
    /// Overrides the region from the AWS environment
    pub region: Option<String>,
    /// Custom S3-compatible endpoint
    pub endpoint: Option<String>,
}

/// External indexing tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            program: "conda".to_string(),
            args: vec!["index".to_string()],
            timeout_secs: 300,
        }
    }
}

impl IndexerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Publishing to anaconda.org through the `anaconda` client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub program: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upload under this organization instead of the user account
    pub organization: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            program: "anaconda".to_string(),
            username: None,
            password: None,
            organization: None,
            timeout_secs: 600,
        }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for ReleaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseConfig")
            .field("program", &self.program)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("organization", &self.organization)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ReleaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_upload_size_mb: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 512,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("."),
            prefix: DEFAULT_PREFIX.to_string(),
            mirror: MirrorConfig::default(),
            indexer: IndexerConfig::default(),
            release: ReleaseConfig::default(),
            limits: LimitsConfig::default(),
            reindex_on_startup: true,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path.as_ref())?;
        let mut config: Config = serde_json::from_str(&config_str).map_err(|e| {
            AppError::Internal(format!(
                "Invalid configuration file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        config.prefix = normalize_prefix(&config.prefix);
        Ok(config)
    }

    /// Load configuration from a file if it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.port == 0 {
            return Err(AppError::BadRequest("port must be non-zero".to_string()));
        }
        if self.indexer.program.trim().is_empty() {
            return Err(AppError::BadRequest(
                "indexer program must not be empty".to_string(),
            ));
        }
        if self.indexer.timeout_secs == 0 || self.release.timeout_secs == 0 {
            return Err(AppError::BadRequest(
                "tool timeouts must be at least one second".to_string(),
            ));
        }
        if self.limits.max_upload_size_mb == 0 {
            return Err(AppError::BadRequest(
                "max_upload_size_mb must be non-zero".to_string(),
            ));
        }
        let first_segment = self.prefix.trim_start_matches('/').split('/').next();
        if matches!(first_segment, Some(s) if RESERVED_PREFIXES.contains(&s)) {
            return Err(AppError::BadRequest(format!(
                "prefix {} collides with a root route",
                self.prefix
            )));
        }
        if matches!(self.mirror.bucket.as_deref(), Some(b) if b.trim().is_empty()) {
            return Err(AppError::BadRequest("S3 bucket name is empty".to_string()));
        }
        Ok(())
    }

    /// Root of the per-platform package directories.
    pub fn pkgs_dir(&self) -> PathBuf {
        self.data_dir.join("pkgs")
    }

    /// Holding area for deletes that have not been committed yet.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join(".staging")
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.limits.max_upload_size_mb * 1024 * 1024
    }
}

/// Normalize a URL prefix to start with `/` and not end with `/`.
///
/// `""` and `"/"` both normalize to the empty prefix, meaning pages are only
/// served at the root.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
