//! End-to-end tests over a signed local repository.

mod common;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use apk2oci_core::arch::Arch;
use apk2oci_core::config::{BuildConfig, ProviderConfig};
use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::media::{CHART_CONFIG_MEDIA_TYPE, CHART_LAYER_MEDIA_TYPE};
use apk2oci_runtime::apk::fetch_package_file;
use apk2oci_runtime::chart::{build, publish_chart, resolve_package, ChartBuilder, PublishRequest};
use apk2oci_runtime::oci::{sha256_digest, write_oci_layout, Artifact, ChartPusher, ImageReference};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use parking_lot::Mutex;

fn config(repo: &std::path::Path, version: Option<&str>) -> BuildConfig {
    BuildConfig {
        version: version.map(str::to_string),
        keys: vec![common::public_key_path()],
        repositories: vec![repo.display().to_string()],
        arch: Arch::Aarch64,
        ..Default::default()
    }
}

fn layer_files(artifact: &Artifact) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(artifact.layers()[0].data()));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (name, content)
        })
        .collect()
}

#[tokio::test]
async fn test_fetch_and_build_from_temp_file() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());
    let config = config(repo.path(), Some("1.20.3-r0"));

    let set = resolve_package("istio-charts-base", &config).await.unwrap();
    let file = fetch_package_file(&set, "istio-charts-base", config.fetch_timeout)
        .await
        .unwrap();
    assert_eq!(file.version(), "1.20.3-r0");
    assert!(file.path().exists());

    let builder = ChartBuilder::new(file.path()).unwrap();
    let artifact = builder.artifact().unwrap();
    builder.cleanup().unwrap();

    assert_eq!(artifact.layers().len(), 1);
    assert_eq!(artifact.layers()[0].media_type(), CHART_LAYER_MEDIA_TYPE);
    let config_layer = artifact.config_layer();
    assert_eq!(config_layer.media_type(), CHART_CONFIG_MEDIA_TYPE);

    let canonical = builder.metadata().unwrap().to_config_json().unwrap();
    assert_eq!(artifact.manifest().config.digest, sha256_digest(&canonical));

    let path = file.path().to_path_buf();
    file.close().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_latest_version_is_default() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());

    let set = resolve_package("istio-charts-base", &config(repo.path(), None))
        .await
        .unwrap();
    let selected = set.select("istio-charts-base").unwrap();
    assert_eq!(selected.version().as_str(), "1.20.3-r0");
    assert!(set.select("istio-crds").is_ok());
}

#[tokio::test]
async fn test_unknown_package() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());

    let err = build("istio-charts-nope", &config(repo.path(), None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nothing provides"), "{}", err);
}

#[tokio::test]
async fn test_unsatisfiable_version() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());

    let err = build("istio-charts-base", &config(repo.path(), Some("9.9.9-r0")))
        .await
        .unwrap_err();
    assert!(matches!(err, ChartError::Unsatisfiable { .. }));
    assert!(err.to_string().contains("does not satisfy"), "{}", err);
}

#[tokio::test]
async fn test_untrusted_repository_rejected() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());
    let mut config = config(repo.path(), None);
    config.keys.clear();

    let err = build("istio-charts-base", &config).await.unwrap_err();
    assert!(err.to_string().contains("untrusted key"), "{}", err);
}

#[tokio::test]
async fn test_build_is_deterministic() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());
    let mut config = config(repo.path(), Some("1.20.3-r0"));
    config.patches.insert(
        "values.yaml".to_string(),
        br#"[{"op":"replace","path":"/image/tag","value":"v9"}]"#.to_vec(),
    );

    let first = build("istio-charts-base", &config).await.unwrap();
    let second = build("istio-charts-base", &config).await.unwrap();
    assert_eq!(first.raw_manifest(), second.raw_manifest());
    assert_eq!(first.digest(), second.digest());
}

#[tokio::test]
async fn test_nested_descriptor_is_not_a_chart() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());

    let err = build("nested-chart", &config(repo.path(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, ChartError::ChartNotFound(_)), "{}", err);
}

#[tokio::test]
async fn test_values_patch_preserves_layout() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());
    let mut config = config(repo.path(), Some("1.20.3-r0"));
    config.patches.insert(
        "values.yaml".to_string(),
        br#"[{"op":"replace","path":"/image/tag","value":"v9"}]"#.to_vec(),
    );

    let artifact = build("istio-charts-base", &config).await.unwrap();
    let files = layer_files(&artifact);

    let values = String::from_utf8(files["base/values.yaml"].clone()).unwrap();
    assert_eq!(values, common::VALUES_YAML.replace("tag: v1", "tag: v9"));
    assert!(files.contains_key("base/templates/crds.yaml"));
    assert!(!files.keys().any(|name| name.starts_with("var/")));
}

#[tokio::test]
async fn test_manifest_is_valid_oci() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());

    let artifact = build("istio-charts-base", &config(repo.path(), None))
        .await
        .unwrap();
    let manifest: oci_spec::image::ImageManifest =
        serde_json::from_slice(artifact.raw_manifest()).unwrap();
    assert_eq!(manifest.layers().len(), 1);
    assert_eq!(
        manifest.annotations().as_ref().unwrap()["org.opencontainers.image.title"],
        "base"
    );

    let out = tempfile::tempdir().unwrap();
    write_oci_layout(&artifact, out.path(), None).unwrap();
    assert!(out.path().join("index.json").exists());
}

#[derive(Default)]
struct RecordingPusher {
    pushed: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChartPusher for RecordingPusher {
    async fn push(&self, repository: &ImageReference, artifact: &Artifact) -> Result<String> {
        self.pushed
            .lock()
            .push((repository.to_string(), artifact.digest().to_string()));
        Ok(artifact.digest().to_string())
    }
}

#[tokio::test]
async fn test_publish_chart() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());
    let provider = ProviderConfig {
        package_repositories: vec![repo.path().display().to_string()],
        public_keys: vec![common::public_key_path()],
        default_arch: Some(Arch::Aarch64),
        allow_untrusted: false,
    };
    let request = PublishRequest {
        package: "istio-charts-base".to_string(),
        version: Some("1.20.3-r0".to_string()),
        repository: "registry.example.dev/charts/base".to_string(),
        ..Default::default()
    };

    let pusher = Arc::new(RecordingPusher::default());
    let published = publish_chart(&request, &provider, pusher.as_ref()).await.unwrap();

    assert_eq!(published.name, "base");
    assert_eq!(published.version, "1.20.3");
    assert_eq!(
        published.id,
        format!("registry.example.dev/charts/base@{}", published.digest)
    );
    let pushed = pusher.pushed.lock();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].1, published.digest);
}

/// Fails every push after noting what the work directory held.
struct FailingPusher {
    work_dir: PathBuf,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ChartPusher for FailingPusher {
    async fn push(&self, repository: &ImageReference, _artifact: &Artifact) -> Result<String> {
        let names = std::fs::read_dir(&self.work_dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        self.seen.lock().extend(names);
        Err(ChartError::RegistryError {
            registry: repository.registry.clone(),
            message: "denied".to_string(),
        })
    }
}

#[tokio::test]
async fn test_publish_failure_releases_temporary_files() {
    let repo = tempfile::tempdir().unwrap();
    common::istio_repository(repo.path());
    let work = tempfile::tempdir().unwrap();
    let provider = ProviderConfig {
        package_repositories: vec![repo.path().display().to_string()],
        public_keys: vec![common::public_key_path()],
        default_arch: Some(Arch::Aarch64),
        allow_untrusted: false,
    };
    let request = PublishRequest {
        package: "istio-charts-base".to_string(),
        repository: "registry.example.dev/charts/base".to_string(),
        work_dir: Some(work.path().to_path_buf()),
        ..Default::default()
    };
    let pusher = FailingPusher {
        work_dir: work.path().to_path_buf(),
        seen: Mutex::new(Vec::new()),
    };

    let err = publish_chart(&request, &provider, &pusher).await.unwrap_err();
    assert!(matches!(err, ChartError::RegistryError { .. }), "{}", err);

    let seen = pusher.seen.lock();
    assert!(seen.iter().any(|n| n.starts_with("apk-") && n.ends_with(".apk")), "{:?}", seen);
    assert!(seen.iter().any(|n| n.starts_with("apk-extract-")), "{:?}", seen);
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_publish_rejects_tagged_repository() {
    let provider = ProviderConfig::default();
    let request = PublishRequest {
        package: "istio-charts-base".to_string(),
        repository: "registry.example.dev/charts/base:latest".to_string(),
        ..Default::default()
    };
    let err = publish_chart(&request, &provider, &RecordingPusher::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ChartError::ConfigError(_)));
}
