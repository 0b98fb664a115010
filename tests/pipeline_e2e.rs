//! End-to-end pipeline tests over the in-memory and filesystem stores.
//!
//! Projects here carry no dependency manifest, so builds package source only
//! and never shell out to an installer.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use packbox::store::{ArtifactStore, TAG_CODE_SHA256, TAG_RUNTIME, TAG_SOURCE_HASH};
use packbox::{
    init, BuildConfig, FsObjectClient, Kind, ManagerPreference, MemoryObjectClient, ObjectClient,
    PackError, Project, Runtime,
};
use tempfile::TempDir;
use zip::ZipArchive;

fn test_config(work: &Path) -> BuildConfig {
    BuildConfig {
        runtime: Some(Runtime::Python311),
        manager: ManagerPreference::Auto,
        extra_ignores: vec![],
        slim: true,
        slim_patterns: vec![
            "**/__pycache__/**".to_string(),
            "*.pyc".to_string(),
            "*.pyo".to_string(),
        ],
        docker_enabled: false,
        dockerfile: None,
        image: None,
        env_prefixes: vec!["PIP_".to_string(), "PACKBOX_".to_string()],
        cache_enabled: false,
        work_root: work.to_path_buf(),
        store_prefix: "packages".to_string(),
        object_prefix: None,
        license: Some("MIT".to_string()),
        compatible_runtimes: vec![],
        compatible_architectures: vec!["x86_64".to_string()],
    }
}

fn write_sample_project(dir: &Path) {
    fs::write(dir.join("app.py"), "def handler(event, context):\n    return 'ok'\n").unwrap();
    fs::create_dir_all(dir.join("lib")).unwrap();
    fs::write(dir.join("lib/util.py"), "VALUE = 42\n").unwrap();
}

fn memory_store(client: Arc<MemoryObjectClient>) -> ArtifactStore {
    ArtifactStore::new(client, "packages".to_string(), None)
}

#[tokio::test]
async fn test_build_upload_then_reuse() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    write_sample_project(src.path());

    let client = Arc::new(MemoryObjectClient::new());
    let store = memory_store(client.clone());

    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let artifact = init(&project, Kind::Function, &store).await.unwrap();
    assert_eq!(client.put_count(), 1);

    let descriptor = artifact.descriptor().await.unwrap();
    assert_eq!(descriptor.runtime, "python3.11");
    assert_eq!(descriptor.license.as_deref(), Some("MIT"));
    assert_eq!(descriptor.compatible_architectures, vec!["x86_64"]);
    // sha256 is stored base64-encoded, md5 as hex
    assert_eq!(descriptor.code_sha256.len(), 44);
    assert_eq!(artifact.md5_checksum().await.unwrap().len(), 32);

    let tags = client.get_tags(artifact.key()).await.unwrap();
    assert_eq!(
        tags.get(TAG_SOURCE_HASH).map(String::as_str),
        Some(project.source_hash().unwrap().as_str())
    );
    project.cleanup();

    // Same tree again: the stored artifact is reused, nothing re-uploaded
    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let reused = init(&project, Kind::Function, &store).await.unwrap();
    assert_eq!(client.put_count(), 1);
    assert_eq!(reused.key(), artifact.key());
    assert_eq!(
        reused.code_sha256().await.unwrap(),
        descriptor.code_sha256
    );
    project.cleanup();
}

#[tokio::test]
async fn test_source_change_produces_new_key() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    write_sample_project(src.path());

    let client = Arc::new(MemoryObjectClient::new());
    let store = memory_store(client.clone());

    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let first = init(&project, Kind::Function, &store).await.unwrap();
    let first_key = first.key().to_string();
    project.cleanup();

    fs::write(src.path().join("app.py"), "def handler(event, context):\n    return 'v2'\n")
        .unwrap();
    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let second = init(&project, Kind::Function, &store).await.unwrap();

    assert_ne!(second.key(), first_key);
    assert_eq!(client.put_count(), 2);
    assert_eq!(client.object_count(), 2);
    project.cleanup();
}

#[tokio::test]
async fn test_runtime_mismatch_evicts_and_rebuilds() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    write_sample_project(src.path());

    let client = Arc::new(MemoryObjectClient::new());
    let store = memory_store(client.clone());

    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let key = store.key_for(
        Kind::Function,
        project.root_name(),
        &project.source_hash().unwrap(),
    );
    client.seed(
        &key,
        1000,
        [
            (TAG_RUNTIME.to_string(), "python3.10".to_string()),
            (TAG_CODE_SHA256.to_string(), "c3RhbGU=".to_string()),
        ]
        .into_iter()
        .collect(),
    );

    let artifact = init(&project, Kind::Function, &store).await.unwrap();
    assert_eq!(artifact.key(), key);
    assert_eq!(client.put_count(), 1);

    let tags = client.get_tags(&key).await.unwrap();
    assert_eq!(tags.get(TAG_RUNTIME).map(String::as_str), Some("python3.11"));
    assert_ne!(tags.get(TAG_CODE_SHA256).map(String::as_str), Some("c3RhbGU="));
    project.cleanup();
}

#[tokio::test]
async fn test_missing_runtime_tag_is_provenance_error() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    write_sample_project(src.path());

    let client = Arc::new(MemoryObjectClient::new());
    let store = memory_store(client.clone());

    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let key = store.key_for(
        Kind::Function,
        project.root_name(),
        &project.source_hash().unwrap(),
    );
    client.seed(
        &key,
        1000,
        [(TAG_CODE_SHA256.to_string(), "c29tZWhhc2g=".to_string())]
            .into_iter()
            .collect(),
    );

    let err = init(&project, Kind::Function, &store).await.err().unwrap();
    assert!(matches!(err, PackError::MissingProvenance { .. }));
    // Nothing was rebuilt over the suspect object
    assert_eq!(client.put_count(), 0);
}

#[tokio::test]
async fn test_empty_tree_is_rejected() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    fs::write(src.path().join(".packboxignore"), "*.log\n").unwrap();
    fs::write(src.path().join("noise.log"), "not packaged").unwrap();

    let client = Arc::new(MemoryObjectClient::new());
    let store = memory_store(client.clone());

    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let err = init(&project, Kind::Function, &store).await.err().unwrap();

    assert!(matches!(err, PackError::EmptyArtifact(_)));
    assert_eq!(client.put_count(), 0);
}

#[tokio::test]
async fn test_function_and_layer_layouts() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_sample_project(src.path());

    let client = Arc::new(FsObjectClient::new(store_dir.path().to_path_buf()).unwrap());
    let store = ArtifactStore::new(client, "packages".to_string(), None);

    let project = Project::new(src.path().to_path_buf(), test_config(work.path())).unwrap();
    let function = init(&project, Kind::Function, &store).await.unwrap();
    let layer = init(&project, Kind::Layer, &store).await.unwrap();
    assert_ne!(function.key(), layer.key());
    assert!(function.key().contains("/functions/"));
    assert!(layer.key().contains("/layers/"));

    let function_entries = entry_names(&store_dir.path().join(function.key()));
    assert!(function_entries.contains(&"app.py".to_string()));
    assert!(function_entries.contains(&"lib/util.py".to_string()));

    let layer_entries = entry_names(&store_dir.path().join(layer.key()));
    assert!(layer_entries.iter().all(|name| name.starts_with("python/")));
    assert!(layer_entries.contains(&"python/app.py".to_string()));
    project.cleanup();
}

fn entry_names(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
