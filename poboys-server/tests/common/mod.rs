//! Common test utilities and helpers
//!
//! Test doubles for the external collaborators (indexing tool, object store,
//! release tool) plus a helper that wires them into a real router served by
//! `axum-test`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;
use serde_json::Value;
use tempfile::TempDir;

use poboys_server::config::Config;
use poboys_server::index::{IndexArtifacts, IndexGenerator, INDEX_ARTIFACTS};
use poboys_server::mirror::{MirrorSync, ObjectStore};
use poboys_server::release::ReleasePublisher;
use poboys_server::store::PlatformStore;
use poboys_server::{build_router, AppResult, AppState, Platform, Repository};

pub const TEST_BUCKET: &str = "test-bucket";

/// Index generator that writes a manifest of the package files it sees.
///
/// `repodata.json` holds `{"packages": [...]}` with the sorted names of every
/// non-index file in the directory; the other artifacts get the same bytes.
#[derive(Debug, Default)]
pub struct ManifestIndexer {
    runs: AtomicUsize,
}

impl ManifestIndexer {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexGenerator for ManifestIndexer {
    async fn reindex(&self, platform_dir: &Path) -> AppResult<IndexArtifacts> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        let mut packages = Vec::new();
        for entry in std::fs::read_dir(platform_dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !INDEX_ARTIFACTS.contains(&name.as_str()) {
                packages.push(name);
            }
        }
        packages.sort();

        let manifest = serde_json::json!({ "packages": packages }).to_string();
        for artifact in INDEX_ARTIFACTS {
            std::fs::write(platform_dir.join(artifact), &manifest)?;
        }
        Ok(IndexArtifacts::standard())
    }
}

/// Package names recorded in a platform's `repodata.json`.
pub fn indexed_packages(platform_dir: &Path) -> Vec<String> {
    let raw = std::fs::read_to_string(platform_dir.join("repodata.json"))
        .expect("repodata.json should exist");
    let manifest: Value = serde_json::from_str(&raw).expect("repodata.json should be JSON");
    manifest["packages"]
        .as_array()
        .expect("packages should be a list")
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect()
}

/// In-memory object store that records every call and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    failing_suffix: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only calls whose key ends with `suffix`.
    pub fn fail_keys_ending_with(&self, suffix: &str) {
        *self.failing_suffix.lock().unwrap() = Some(suffix.to_string());
    }

    /// Calls in order, as `"put <key>"` or `"delete <key>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn check(&self, key: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("simulated outage");
        }
        if let Some(suffix) = self.failing_suffix.lock().unwrap().as_deref() {
            if key.ends_with(suffix) {
                anyhow::bail!("simulated outage for {key}");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("put {key}"));
        self.check(key)?;
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("delete {key}"));
        self.check(key)?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Release publisher that returns fixed output and records its calls.
#[derive(Debug)]
pub struct CannedPublisher {
    output: Vec<u8>,
    calls: Mutex<Vec<(Platform, PathBuf, String)>>,
}

impl CannedPublisher {
    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Platform, PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleasePublisher for CannedPublisher {
    async fn release(&self, platform: Platform, platform_dir: &Path, filename: &str) -> Vec<u8> {
        self.calls
            .lock()
            .unwrap()
            .push((platform, platform_dir.to_path_buf(), filename.to_string()));
        self.output.clone()
    }
}

/// Optional collaborators for [`create_test_app`].
#[derive(Default)]
pub struct TestOptions {
    pub prefix: Option<String>,
    pub mirror: Option<Arc<RecordingStore>>,
    pub publisher: Option<Arc<CannedPublisher>>,
    pub max_upload_size_mb: Option<usize>,
}

/// A served router over a temporary package tree.
pub struct TestApp {
    pub temp_dir: TempDir,
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub indexer: Arc<ManifestIndexer>,
}

impl TestApp {
    pub fn pkgs_dir(&self) -> PathBuf {
        self.state.config.pkgs_dir()
    }

    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.pkgs_dir().join(platform.as_str())
    }
}

pub fn test_config(data_dir: &Path, options: &TestOptions) -> Config {
    let mut config = Config {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    if let Some(prefix) = &options.prefix {
        config.prefix = poboys_server::config::normalize_prefix(prefix);
    }
    if let Some(limit) = options.max_upload_size_mb {
        config.limits.max_upload_size_mb = limit;
    }
    if options.mirror.is_some() {
        config.mirror.bucket = Some(TEST_BUCKET.to_string());
    }
    config
}

/// Build a repository with test doubles, lay out the tree and serve it.
pub async fn create_test_app(options: TestOptions) -> Result<TestApp> {
    let temp_dir = TempDir::new()?;
    let config = Arc::new(test_config(temp_dir.path(), &options));

    let indexer = Arc::new(ManifestIndexer::default());
    let mirror = match &options.mirror {
        Some(store) => MirrorSync::new(TEST_BUCKET, store.clone()),
        None => MirrorSync::disabled(),
    };
    let store = PlatformStore::new(config.pkgs_dir(), config.staging_dir());
    let mut repo = Repository::new(store, indexer.clone(), mirror);
    if let Some(publisher) = &options.publisher {
        repo = repo.with_publisher(publisher.clone());
    }
    repo.bootstrap().await?;

    let state = Arc::new(AppState::new(config, repo));
    let server = TestServer::new(build_router(state.clone()))?;

    Ok(TestApp {
        temp_dir,
        server,
        state,
        indexer,
    })
}

/// Multipart body matching the landing page upload form.
pub fn upload_form(platform: &str, filename: &str, content: &[u8]) -> axum_test::multipart::MultipartForm {
    use axum_test::multipart::{MultipartForm, Part};

    let part = Part::bytes(content.to_vec())
        .file_name(filename)
        .mime_type("application/octet-stream");
    MultipartForm::new()
        .add_text("platform", platform.to_string())
        .add_part("fileupload", part)
}

/// Undo askama's escaping of `/` so page assertions can use plain paths.
pub fn unescape_slashes(html: &str) -> String {
    html.replace("&#x2f;", "/")
}
