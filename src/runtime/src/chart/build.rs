//! In-memory build pipeline: resolve, fetch, rewrite, assemble.

use apk2oci_core::config::BuildConfig;
use apk2oci_core::error::{ChartError, Result};

use super::layer::build_layer;
use super::locator::ChartRoot;
use crate::apk::expand::PackageSegments;
use crate::apk::fetch::open_package;
use crate::apk::keyring::Keyring;
use crate::apk::repository::open_source;
use crate::apk::resolver::{PackageQuery, ResolvedPackageSet, Resolver};
use crate::oci::artifact::Artifact;

/// Resolve `name` and its dependency closure with the build's repositories.
pub async fn resolve_package(name: &str, config: &BuildConfig) -> Result<ResolvedPackageSet> {
    let query = PackageQuery::new(name, config.version.as_deref(), config.arch)?;
    let keyring = Keyring::load(&config.keys)?;
    let sources = config
        .repositories
        .iter()
        .map(|location| open_source(location))
        .collect();

    let load = Resolver::load(sources, config.arch, &keyring, config.allow_untrusted);
    let resolver = tokio::time::timeout(config.fetch_timeout, load)
        .await
        .map_err(|_| ChartError::Timeout("loading repository indexes".to_string()))??;

    let set = resolver.resolve(&query)?;
    tracing::info!(
        package = name,
        arch = %config.arch,
        resolved = set.packages.len(),
        conflicts = set.conflicts.len(),
        "Resolved package"
    );
    Ok(set)
}

/// Build the chart artifact for package `name`.
pub async fn build(name: &str, config: &BuildConfig) -> Result<Artifact> {
    let set = resolve_package(name, config).await?;
    let (package, mut reader) = open_package(&set, name, config.fetch_timeout).await?;

    let segments = tokio::time::timeout(config.fetch_timeout, PackageSegments::read_from(&mut reader))
        .await
        .map_err(|_| ChartError::Timeout(format!("reading package {}", package.filename())))??;
    drop(reader);

    let root = ChartRoot::locate(&segments)?;
    let built = build_layer(&root, &config.patches, &config.images)?;
    let artifact = Artifact::new(&built.descriptor, built.layer)?;

    tracing::info!(
        package = %package.name(),
        version = %package.version(),
        chart = %built.descriptor.name,
        digest = %artifact.digest(),
        "Built chart artifact"
    );
    Ok(artifact)
}
