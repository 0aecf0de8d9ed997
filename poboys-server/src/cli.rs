//! Command-line interface for the `poboys` binary.
//!
//! Flags override values read from `--config`, which in turn override the
//! built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{normalize_prefix, Config};
use crate::error::AppResult;

/// Conda package server with optional S3 mirroring and anaconda.org release
#[derive(Parser, Debug, Default)]
#[command(name = "poboys")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [default: 6969]
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding the pkgs/ tree
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// S3 bucket to sync with
    #[arg(long = "s3-bucket", alias = "s3_bucket")]
    pub s3_bucket: Option<String>,

    /// Region for the S3 bucket
    #[arg(long = "s3-region")]
    pub s3_region: Option<String>,

    /// Custom S3-compatible endpoint URL
    #[arg(long = "s3-endpoint")]
    pub s3_endpoint: Option<String>,

    /// Prefix to also serve pages at, i.e. www.example.com and www.example.com/prefix/
    #[arg(long)]
    pub prefix: Option<String>,

    /// Anaconda user name
    #[arg(long = "ac-user", alias = "ac_user")]
    pub ac_user: Option<String>,

    /// Anaconda password
    #[arg(long = "ac-pass", alias = "ac_pass")]
    pub ac_pass: Option<String>,

    /// Anaconda organization to upload releases to
    #[arg(long = "ac-org", alias = "ac_org")]
    pub ac_org: Option<String>,

    /// Program used to build the platform index
    #[arg(long)]
    pub conda: Option<String>,

    /// anaconda-client executable
    #[arg(long)]
    pub anaconda: Option<String>,

    /// Seconds before an index run is killed
    #[arg(long)]
    pub index_timeout: Option<u64>,

    /// Seconds before a release is killed
    #[arg(long)]
    pub release_timeout: Option<u64>,

    /// Largest accepted upload in megabytes
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// Skip reindexing every platform at startup
    #[arg(long)]
    pub no_startup_index: bool,
}

impl Cli {
    /// Resolve the final configuration.
    pub fn into_config(self) -> AppResult<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(prefix) = self.prefix {
            config.prefix = normalize_prefix(&prefix);
        }
        if let Some(bucket) = self.s3_bucket {
            config.mirror.bucket = Some(bucket);
        }
        if let Some(region) = self.s3_region {
            config.mirror.region = Some(region);
        }
        if let Some(endpoint) = self.s3_endpoint {
            config.mirror.endpoint = Some(endpoint);
        }
        if let Some(user) = self.ac_user {
            config.release.username = Some(user);
        }
        if let Some(pass) = self.ac_pass {
            config.release.password = Some(pass);
        }
        if let Some(org) = self.ac_org {
            config.release.organization = Some(org);
        }
        if let Some(conda) = self.conda {
            config.indexer.program = conda;
        }
        if let Some(anaconda) = self.anaconda {
            config.release.program = anaconda;
        }
        if let Some(secs) = self.index_timeout {
            config.indexer.timeout_secs = secs;
        }
        if let Some(secs) = self.release_timeout {
            config.release.timeout_secs = secs;
        }
        if let Some(mb) = self.max_upload_mb {
            config.limits.max_upload_size_mb = mb;
        }
        if self.no_startup_index {
            config.reindex_on_startup = false;
        }
    }
}
