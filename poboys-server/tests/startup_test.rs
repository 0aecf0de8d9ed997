//! Startup tests
//!
//! Covers the work done before the listener binds: laying out platform
//! directories, indexing them and clearing interrupted deletes.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{indexed_packages, ManifestIndexer};
use poboys_server::index::INDEX_ARTIFACTS;
use poboys_server::mirror::MirrorSync;
use poboys_server::store::PlatformStore;
use poboys_server::{Platform, Repository};

fn repository(temp: &TempDir, indexer: Arc<ManifestIndexer>) -> Repository {
    let store = PlatformStore::new(temp.path().join("pkgs"), temp.path().join(".staging"));
    Repository::new(store, indexer, MirrorSync::disabled())
}

#[tokio::test]
async fn bootstrap_creates_and_indexes_every_platform() {
    let temp = TempDir::new().unwrap();
    let indexer = Arc::new(ManifestIndexer::default());
    let repo = repository(&temp, indexer.clone());

    repo.bootstrap().await.unwrap();

    assert_eq!(indexer.runs(), Platform::ALL.len());
    for platform in Platform::ALL {
        let dir = temp.path().join("pkgs").join(platform.as_str());
        assert!(dir.is_dir(), "{platform} directory missing");
        assert!(indexed_packages(&dir).is_empty());
    }
    assert_eq!(
        repo.list_platforms().await.unwrap(),
        vec!["linux-64", "linux-ppc64le", "noarch", "osx-64", "win-64"]
    );
}

#[tokio::test]
async fn bootstrap_indexes_existing_packages() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("pkgs/noarch");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("preexisting-1.0-0.tar.bz2"), b"x").unwrap();

    let repo = repository(&temp, Arc::new(ManifestIndexer::default()));
    repo.bootstrap().await.unwrap();

    assert_eq!(indexed_packages(&dir), vec!["preexisting-1.0-0.tar.bz2"]);
}

#[tokio::test]
async fn leftover_staged_deletes_are_purged() {
    let temp = TempDir::new().unwrap();
    let staged = temp.path().join(".staging/win-64");
    std::fs::create_dir_all(&staged).unwrap();
    std::fs::write(staged.join("half-deleted-1.0-0.tar.bz2"), b"x").unwrap();

    let indexer = Arc::new(ManifestIndexer::default());
    let repo = repository(&temp, indexer.clone());
    repo.prepare_layout().await.unwrap();

    assert!(!staged.join("half-deleted-1.0-0.tar.bz2").exists());
    assert_eq!(indexer.runs(), 0, "prepare_layout must not reindex");
    assert!(temp.path().join("pkgs/win-64").is_dir());
}

#[tokio::test]
async fn reindexing_without_changes_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("pkgs/osx-64");
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["b-2.0-0.tar.bz2", "a-1.0-0.tar.bz2"] {
        std::fs::write(dir.join(name), name).unwrap();
    }
    let repo = repository(&temp, Arc::new(ManifestIndexer::default()));
    let artifacts = |dir: &std::path::Path| -> Vec<Vec<u8>> {
        INDEX_ARTIFACTS
            .iter()
            .map(|name| std::fs::read(dir.join(name)).unwrap())
            .collect()
    };

    repo.bootstrap().await.unwrap();
    let first = artifacts(&dir);
    repo.bootstrap().await.unwrap();

    assert_eq!(artifacts(&dir), first);
    assert_eq!(indexed_packages(&dir), vec!["a-1.0-0.tar.bz2", "b-2.0-0.tar.bz2"]);
}
