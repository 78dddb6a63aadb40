//! Helm chart OCI artifact.
//!
//! An artifact holds one manifest, one config blob (the serialized chart
//! descriptor) and one content layer. Both blobs are indexed by digest
//! and diff-id when the artifact is constructed; nothing mutates it after.

use std::collections::{BTreeMap, HashMap};

use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::media::{CHART_CONFIG_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
use serde::{Deserialize, Serialize};

use super::digest::sha256_digest;
use crate::chart::descriptor::ChartDescriptor;

/// A content-addressed blob of the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    media_type: String,
    data: Vec<u8>,
    digest: String,
    diff_id: String,
}

impl Layer {
    /// A compressed layer whose uncompressed form hashes to `diff_id`.
    pub fn new(media_type: impl Into<String>, data: Vec<u8>, diff_id: String) -> Self {
        let digest = sha256_digest(&data);
        Self {
            media_type: media_type.into(),
            data,
            digest,
            diff_id,
        }
    }

    /// An uncompressed blob; digest and diff-id coincide.
    pub fn uncompressed(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        let digest = sha256_digest(&data);
        Self {
            media_type: media_type.into(),
            data,
            diff_id: digest.clone(),
            digest,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn diff_id(&self) -> &str {
        &self.diff_id
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Descriptor referencing this blob.
    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            media_type: self.media_type.clone(),
            digest: self.digest.clone(),
            size: self.size(),
            annotations: BTreeMap::new(),
        }
    }
}

/// OCI content descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A built chart artifact, ready to push or export.
#[derive(Debug, Clone)]
pub struct Artifact {
    manifest: Manifest,
    raw_manifest: Vec<u8>,
    digest: String,
    /// Config blob first, then the content layer
    blobs: Vec<Layer>,
    by_digest: HashMap<String, usize>,
    by_diff_id: HashMap<String, usize>,
}

impl Artifact {
    /// Assemble the artifact for a chart and its content layer.
    pub fn new(chart: &ChartDescriptor, content: Layer) -> Result<Self> {
        let config = Layer::uncompressed(CHART_CONFIG_MEDIA_TYPE, chart.to_config_json()?);

        let manifest = Manifest {
            schema_version: 2,
            media_type: OCI_MANIFEST_MEDIA_TYPE.to_string(),
            config: config.descriptor(),
            layers: vec![content.descriptor()],
            annotations: chart.manifest_annotations(),
        };
        let raw_manifest = serde_json::to_vec(&manifest)
            .map_err(|e| ChartError::Manifest(format!("failed to serialize manifest: {}", e)))?;
        let digest = sha256_digest(&raw_manifest);

        let blobs = vec![config, content];
        let mut by_digest = HashMap::new();
        let mut by_diff_id = HashMap::new();
        for (i, blob) in blobs.iter().enumerate() {
            by_digest.insert(blob.digest().to_string(), i);
            by_diff_id.insert(blob.diff_id().to_string(), i);
        }

        tracing::debug!(
            digest = %digest,
            config = %blobs[0].digest(),
            layer = %blobs[1].digest(),
            "Assembled chart manifest"
        );

        Ok(Self {
            manifest,
            raw_manifest,
            digest,
            blobs,
            by_digest,
            by_diff_id,
        })
    }

    /// Digest of the raw manifest bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Size of the raw manifest bytes.
    pub fn size(&self) -> u64 {
        self.raw_manifest.len() as u64
    }

    pub fn raw_manifest(&self) -> &[u8] {
        &self.raw_manifest
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn media_type(&self) -> &str {
        &self.manifest.media_type
    }

    /// Name (digest) of the config blob.
    pub fn config_name(&self) -> &str {
        self.config_layer().digest()
    }

    pub fn raw_config(&self) -> &[u8] {
        self.config_layer().data()
    }

    pub fn config_layer(&self) -> &Layer {
        &self.blobs[0]
    }

    /// Content layers, in manifest order.
    pub fn layers(&self) -> &[Layer] {
        &self.blobs[1..]
    }

    pub fn layer_by_digest(&self, digest: &str) -> Option<&Layer> {
        self.by_digest.get(digest).map(|&i| &self.blobs[i])
    }

    pub fn layer_by_diff_id(&self, diff_id: &str) -> Option<&Layer> {
        self.by_diff_id.get(diff_id).map(|&i| &self.blobs[i])
    }

    /// Descriptor referencing the manifest itself.
    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            media_type: self.manifest.media_type.clone(),
            digest: self.digest.clone(),
            size: self.size(),
            annotations: BTreeMap::new(),
        }
    }
}
