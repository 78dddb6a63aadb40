//! Chart builder over a package file on disk.
//!
//! Construction validates the path and claims an extraction directory.
//! `ensure_initialized` splits the package into that directory and
//! locates the chart exactly once; the first outcome, success or error,
//! is replayed to every later caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use apk2oci_core::error::{ChartError, Result};
use parking_lot::Mutex;
use tempfile::TempDir;

use super::descriptor::ChartDescriptor;
use super::layer::build_layer;
use super::locator::ChartRoot;
use crate::apk::expand::PackageSegments;
use crate::oci::artifact::Artifact;

/// Builds a chart artifact from one `.apk` file.
#[derive(Debug)]
pub struct ChartBuilder {
    apk_path: PathBuf,
    extract_dir: Mutex<Option<TempDir>>,
    patches: BTreeMap<String, Vec<u8>>,
    images: BTreeMap<String, String>,
    state: Mutex<Option<Result<Arc<ChartRoot>>>>,
}

impl ChartBuilder {
    /// Create a builder for `apk_path` with its own extraction directory.
    pub fn new(apk_path: impl Into<PathBuf>) -> Result<Self> {
        Self::new_in(apk_path, std::env::temp_dir())
    }

    /// Like [`ChartBuilder::new`], with the extraction directory created
    /// under `work_dir`.
    pub fn new_in(apk_path: impl Into<PathBuf>, work_dir: impl AsRef<Path>) -> Result<Self> {
        let apk_path = apk_path.into();
        if apk_path.as_os_str().is_empty() {
            return Err(ChartError::ConfigError("invalid APK file path".to_string()));
        }
        if apk_path.is_dir() {
            return Err(ChartError::ConfigError(format!(
                "{} is a directory",
                apk_path.display()
            )));
        }

        let extract_dir = tempfile::Builder::new()
            .prefix("apk-extract-")
            .tempdir_in(work_dir)?;
        tracing::debug!(
            apk = %apk_path.display(),
            dir = %extract_dir.path().display(),
            "Created extraction directory"
        );

        Ok(Self {
            apk_path,
            extract_dir: Mutex::new(Some(extract_dir)),
            patches: BTreeMap::new(),
            images: BTreeMap::new(),
            state: Mutex::new(None),
        })
    }

    /// Patches applied by [`ChartBuilder::artifact`].
    pub fn with_patches(mut self, patches: BTreeMap<String, Vec<u8>>) -> Self {
        self.patches = patches;
        self
    }

    /// Image references applied by [`ChartBuilder::artifact`].
    pub fn with_images(mut self, images: BTreeMap<String, String>) -> Self {
        self.images = images;
        self
    }

    pub fn apk_path(&self) -> &Path {
        &self.apk_path
    }

    /// Extraction directory, until [`ChartBuilder::cleanup`] runs.
    pub fn extract_dir(&self) -> Option<PathBuf> {
        self.extract_dir.lock().as_ref().map(|d| d.path().to_path_buf())
    }

    /// Split the package and locate the chart, once.
    pub fn ensure_initialized(&self) -> Result<Arc<ChartRoot>> {
        let mut state = self.state.lock();
        if let Some(outcome) = state.as_ref() {
            return outcome.clone();
        }
        let outcome = self.initialize().map(Arc::new);
        if let Err(e) = &outcome {
            tracing::debug!(apk = %self.apk_path.display(), error = %e, "Chart builder initialization failed");
        }
        *state = Some(outcome.clone());
        outcome
    }

    fn initialize(&self) -> Result<ChartRoot> {
        let dir = self.extract_dir().ok_or_else(|| {
            ChartError::Other(format!(
                "chart builder for {} was already cleaned up",
                self.apk_path.display()
            ))
        })?;

        let data = std::fs::read(&self.apk_path)?;
        let segments = PackageSegments::split(&data)?;
        for (i, segment) in segments.segments().iter().enumerate() {
            let name = format!("segment-{:02}.tar.gz", i);
            std::fs::write(dir.join(name), segment.compressed())?;
        }
        tracing::debug!(
            apk = %self.apk_path.display(),
            segments = segments.len(),
            "Split package"
        );

        ChartRoot::locate(&segments)
    }

    /// Descriptor of the chart as shipped in the package.
    pub fn metadata(&self) -> Result<ChartDescriptor> {
        Ok(self.ensure_initialized()?.descriptor.clone())
    }

    /// Build the artifact with the configured patches and images.
    pub fn artifact(&self) -> Result<Artifact> {
        let root = self.ensure_initialized()?;
        let built = build_layer(&root, &self.patches, &self.images)?;
        Artifact::new(&built.descriptor, built.layer)
    }

    /// Remove the extraction directory. Safe to call more than once.
    pub fn cleanup(&self) -> Result<()> {
        match self.extract_dir.lock().take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()?;
                tracing::debug!(dir = %path.display(), "Removed extraction directory");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
