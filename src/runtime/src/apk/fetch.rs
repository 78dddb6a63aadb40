//! Downloading resolved packages.

use std::path::Path;
use std::time::Duration;

use apk2oci_core::error::{ChartError, Result};
use tempfile::TempPath;

use super::repository::PackageReader;
use super::resolver::{ResolvedPackage, ResolvedPackageSet};

/// A downloaded package held in a temporary file.
///
/// The file is deleted when the guard is dropped or closed.
#[derive(Debug)]
pub struct PackageFile {
    path: TempPath,
    name: String,
    version: String,
}

impl PackageFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Delete the file now, reporting failures.
    pub fn close(self) -> Result<()> {
        self.path.close().map_err(ChartError::from)
    }
}

/// Pick the package named `name` from a conflict-free set.
fn select<'a>(set: &'a ResolvedPackageSet, name: &str) -> Result<&'a ResolvedPackage> {
    set.ensure_no_conflicts()?;
    set.select(name)
}

/// Open the stream of the package named `name`.
pub async fn open_package(
    set: &ResolvedPackageSet,
    name: &str,
    timeout: Duration,
) -> Result<(ResolvedPackage, PackageReader)> {
    let package = select(set, name)?.clone();
    let filename = package.filename();
    let reader = tokio::time::timeout(timeout, package.source.open(package.arch, &filename))
        .await
        .map_err(|_| ChartError::Timeout(format!("opening package {}", filename)))??;
    Ok((package, reader))
}

/// Download the package named `name` into a temporary `apk-*.apk` file.
pub async fn fetch_package_file(
    set: &ResolvedPackageSet,
    name: &str,
    timeout: Duration,
) -> Result<PackageFile> {
    fetch_package_file_in(set, name, timeout, &std::env::temp_dir()).await
}

/// Like [`fetch_package_file`], with the temporary file created in `dir`.
pub async fn fetch_package_file_in(
    set: &ResolvedPackageSet,
    name: &str,
    timeout: Duration,
    dir: &Path,
) -> Result<PackageFile> {
    let package = select(set, name)?;
    let filename = package.filename();

    tracing::info!(
        package = %package.name(),
        version = %package.version(),
        repository = package.source.location(),
        "Fetching package"
    );

    let download = async {
        let mut reader = package.source.open(package.arch, &filename).await?;
        let tmp = tempfile::Builder::new()
            .prefix("apk-")
            .suffix(".apk")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| ChartError::Fetch {
                package: filename.clone(),
                message: e.to_string(),
            })?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        Ok::<_, ChartError>((tmp.into_temp_path(), written))
    };

    // A timed-out download is dropped, closing the stream and deleting the file.
    let (path, written) = tokio::time::timeout(timeout, download)
        .await
        .map_err(|_| ChartError::Timeout(format!("downloading package {}", filename)))??;

    tracing::debug!(path = %path.display(), bytes = written, "Package downloaded");

    Ok(PackageFile {
        path,
        name: package.entry.name.clone(),
        version: package.entry.version.to_string(),
    })
}
