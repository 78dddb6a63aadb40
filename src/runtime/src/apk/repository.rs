//! Package repositories: where indexes and package files come from.
//!
//! A repository location is either a local directory or an `http(s)`
//! URL. Both lay files out as `<repo>/<arch>/APKINDEX.tar.gz` and
//! `<repo>/<arch>/<name>-<version>.apk`.

use std::path::PathBuf;
use std::sync::Arc;

use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::Arch;
use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::expand::PackageSegments;
use super::index::{read_index, IndexEntry};
use super::keyring::Keyring;

/// File name of a repository index.
pub const INDEX_FILE_NAME: &str = "APKINDEX.tar.gz";

/// An opened package stream. Dropping it releases the underlying handle.
pub type PackageReader = Box<dyn AsyncRead + Send + Unpin>;

/// Source of repository indexes and package files.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Location string, as configured.
    fn location(&self) -> &str;

    /// Raw `APKINDEX.tar.gz` bytes for an architecture.
    async fn fetch_index(&self, arch: Arch) -> Result<Vec<u8>>;

    /// Open a package file of the given architecture.
    async fn open(&self, arch: Arch, filename: &str) -> Result<PackageReader>;
}

/// Repository on the local filesystem.
pub struct LocalRepository {
    location: String,
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            location: root.display().to_string(),
            root,
        }
    }
}

#[async_trait]
impl PackageSource for LocalRepository {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch_index(&self, arch: Arch) -> Result<Vec<u8>> {
        let path = self.root.join(arch.apk_name()).join(INDEX_FILE_NAME);
        tokio::fs::read(&path).await.map_err(|e| {
            ChartError::Resolution(format!("failed to read index {}: {}", path.display(), e))
        })
    }

    async fn open(&self, arch: Arch, filename: &str) -> Result<PackageReader> {
        let path = self.root.join(arch.apk_name()).join(filename);
        let file = tokio::fs::File::open(&path).await.map_err(|e| ChartError::Fetch {
            package: filename.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(Box::new(file))
    }
}

/// Repository served over HTTP(S).
pub struct HttpRepository {
    base: String,
    client: reqwest::Client,
}

impl HttpRepository {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(base, reqwest::Client::new())
    }

    pub fn with_client(base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, arch: Arch, filename: &str) -> String {
        format!("{}/{}/{}", self.base, arch.apk_name(), filename)
    }

    async fn get(&self, url: &str) -> std::result::Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("GET {} returned {}", url, status));
        }
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl PackageSource for HttpRepository {
    fn location(&self) -> &str {
        &self.base
    }

    async fn fetch_index(&self, arch: Arch) -> Result<Vec<u8>> {
        let url = self.url(arch, INDEX_FILE_NAME);
        tracing::debug!(url = %url, "Fetching repository index");
        self.get(&url)
            .await
            .map_err(|e| ChartError::Resolution(format!("failed to fetch index: {}", e)))
    }

    async fn open(&self, arch: Arch, filename: &str) -> Result<PackageReader> {
        let url = self.url(arch, filename);
        tracing::debug!(url = %url, "Downloading package");
        let body = self.get(&url).await.map_err(|message| ChartError::Fetch {
            package: filename.to_string(),
            message,
        })?;
        Ok(Box::new(std::io::Cursor::new(body)))
    }
}

/// Pick the source implementation for a configured location.
pub fn open_source(location: &str) -> Arc<dyn PackageSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Arc::new(HttpRepository::new(location))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Arc::new(LocalRepository::new(path))
    }
}

/// A source together with its verified, parsed index.
#[derive(Clone)]
pub struct RepositoryIndex {
    pub source: Arc<dyn PackageSource>,
    pub entries: Vec<IndexEntry>,
}

impl std::fmt::Debug for RepositoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryIndex")
            .field("location", &self.source.location())
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl RepositoryIndex {
    /// Fetch, verify and parse the index of one source.
    pub async fn load(
        source: Arc<dyn PackageSource>,
        arch: Arch,
        keyring: &Keyring,
        allow_untrusted: bool,
    ) -> Result<Self> {
        let raw = source.fetch_index(arch).await?;
        let segments = PackageSegments::split(&raw).map_err(|e| {
            ChartError::Resolution(format!("index of {}: {}", source.location(), e))
        })?;
        keyring.verify(&segments, source.location(), allow_untrusted)?;
        let entries = read_index(&segments)?;

        tracing::debug!(
            repository = source.location(),
            arch = %arch,
            packages = entries.len(),
            "Loaded repository index"
        );

        Ok(Self { source, entries })
    }
}
