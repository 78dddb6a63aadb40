//! Registry push of chart artifacts.
//!
//! Uses the `oci-distribution` crate to upload blobs and the manifest.
//! Manifests are always written by digest, never under a tag.

use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::media::OCI_MANIFEST_MEDIA_TYPE;
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};

use super::artifact::Artifact;
use super::reference::ImageReference;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match (lookup("REGISTRY_USERNAME"), lookup("REGISTRY_PASSWORD")) {
            (Some(username), Some(password)) => Self::basic(username, password),
            _ => Self::anonymous(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Destination for built artifacts.
#[async_trait]
pub trait ChartPusher: Send + Sync {
    /// Push `artifact` into `repository`, returning the manifest digest.
    async fn push(&self, repository: &ImageReference, artifact: &Artifact) -> Result<String>;
}

/// Pushes chart artifacts to an OCI registry.
pub struct RegistryPusher {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryPusher {
    /// Create a new registry pusher with anonymous authentication.
    pub fn new() -> Self {
        Self::with_auth(RegistryAuth::anonymous())
    }

    /// Create a new registry pusher with the given authentication.
    pub fn with_auth(auth: RegistryAuth) -> Self {
        Self::with_protocol(auth, ClientProtocol::Https)
    }

    /// Plain HTTP for the listed registries (local test registries).
    pub fn insecure(auth: RegistryAuth, registries: Vec<String>) -> Self {
        Self::with_protocol(auth, ClientProtocol::HttpsExcept(registries))
    }

    fn with_protocol(auth: RegistryAuth, protocol: ClientProtocol) -> Self {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    fn registry_error(repository: &ImageReference, message: String) -> ChartError {
        ChartError::RegistryError {
            registry: repository.registry.clone(),
            message,
        }
    }
}

impl Default for RegistryPusher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChartPusher for RegistryPusher {
    async fn push(&self, repository: &ImageReference, artifact: &Artifact) -> Result<String> {
        let target = to_oci_reference(repository, artifact.digest());

        tracing::info!(
            repository = %repository,
            digest = %artifact.digest(),
            "Pushing chart to registry"
        );

        self.client
            .auth(&target, &self.auth.to_oci_auth(), RegistryOperation::Push)
            .await
            .map_err(|e| Self::registry_error(repository, format!("Failed to authenticate: {}", e)))?;

        let config = artifact.config_layer();
        let blobs = std::iter::once(config).chain(artifact.layers());
        for blob in blobs {
            tracing::debug!(digest = %blob.digest(), size = blob.size(), "Pushing blob");
            self.client
                .push_blob(&target, blob.data(), blob.digest())
                .await
                .map_err(|e| {
                    Self::registry_error(
                        repository,
                        format!("Failed to push blob {}: {}", blob.digest(), e),
                    )
                })?;
        }

        let content_type = match OCI_MANIFEST_MEDIA_TYPE.parse() {
            Ok(value) => value,
            Err(_) => {
                return Err(Self::registry_error(
                    repository,
                    format!("invalid content type {}", OCI_MANIFEST_MEDIA_TYPE),
                ))
            }
        };
        let manifest_url = self
            .client
            .push_manifest_raw(&target, artifact.raw_manifest().to_vec(), content_type)
            .await
            .map_err(|e| Self::registry_error(repository, format!("Failed to push manifest: {}", e)))?;

        tracing::info!(
            repository = %repository,
            manifest_url = %manifest_url,
            "Chart pushed successfully"
        );

        Ok(artifact.digest().to_string())
    }
}

/// Reference addressing `digest` inside `repository`.
fn to_oci_reference(repository: &ImageReference, digest: &str) -> Reference {
    Reference::with_digest(
        repository.registry.clone(),
        repository.repository.clone(),
        digest.to_string(),
    )
}
