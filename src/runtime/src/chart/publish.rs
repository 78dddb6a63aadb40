//! Publish flow: package in, pushed chart out.
//!
//! Mirrors one resource apply: resolve the architecture, download the
//! package to a temporary file, build the artifact from it and push the
//! result by digest. Every temporary resource is released before return.

use std::collections::BTreeMap;
use std::path::PathBuf;

use apk2oci_core::arch::Arch;
use apk2oci_core::config::{BuildConfig, ProviderConfig};
use apk2oci_core::error::{ChartError, Result};

use super::build::resolve_package;
use super::builder::ChartBuilder;
use super::descriptor::ChartDescriptor;
use crate::apk::fetch::fetch_package_file_in;
use crate::oci::reference::ImageReference;
use crate::oci::registry::ChartPusher;

/// One chart to publish.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Package name
    pub package: String,
    /// Version constraint (`None` = highest available)
    pub version: Option<String>,
    /// Architecture override
    pub arch: Option<Arch>,
    /// Target repository, e.g. `ghcr.io/acme/charts/base`
    pub repository: String,
    pub patches: BTreeMap<String, Vec<u8>>,
    pub images: BTreeMap<String, String>,
    /// Where the package is downloaded and extracted
    pub work_dir: Option<PathBuf>,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedChart {
    /// `<repository>@<digest>`
    pub id: String,
    pub digest: String,
    /// Chart name from the descriptor
    pub name: String,
    /// Chart version from the descriptor
    pub version: String,
}

/// Build and push the chart described by `request`.
pub async fn publish_chart(
    request: &PublishRequest,
    provider: &ProviderConfig,
    pusher: &dyn ChartPusher,
) -> Result<PublishedChart> {
    let repository = ImageReference::parse_repository(&request.repository)?;
    let config = BuildConfig {
        version: request.version.clone(),
        patches: request.patches.clone(),
        images: request.images.clone(),
        work_dir: request.work_dir.clone(),
        ..BuildConfig::from_provider(provider, request.arch)
    };
    let work_dir = config.work_dir.clone().unwrap_or_else(std::env::temp_dir);

    let set = resolve_package(&request.package, &config).await?;
    let file =
        fetch_package_file_in(&set, &request.package, config.fetch_timeout, &work_dir).await?;

    let outcome = async {
        let builder = ChartBuilder::new_in(file.path(), &work_dir)?
            .with_patches(config.patches.clone())
            .with_images(config.images.clone());
        let pushed = async {
            let artifact = builder.artifact()?;
            let digest = pusher.push(&repository, &artifact).await?;
            let chart: ChartDescriptor = serde_json::from_slice(artifact.raw_config())?;
            Ok::<_, ChartError>(PublishedChart {
                id: repository.with_digest(digest.clone()).full_reference(),
                digest,
                name: chart.name,
                version: chart.version,
            })
        }
        .await;
        if let Err(e) = builder.cleanup() {
            tracing::warn!(error = %e, "Failed to remove extraction directory");
        }
        pushed
    }
    .await;

    if let Err(e) = file.close() {
        tracing::warn!(error = %e, "Failed to remove downloaded package");
    }

    if let Ok(published) = &outcome {
        tracing::info!(id = %published.id, "Published chart");
    }
    outcome
}
