//! Image mapping side channel.
//!
//! A chart package may ship `<chart-root>/cg.json`, describing where each
//! image the chart deploys is configured in `values.yaml`:
//!
//! ```json
//! {"images": {"pilot": {"registry": "/pilot/hub", "repository": "/pilot/image",
//!                        "tag": "/pilot/tag", "digest": "/pilot/digest"}}}
//! ```
//!
//! Each pointer is optional. `ref` receives the full reference string.

use std::collections::BTreeMap;

use apk2oci_core::error::{ChartError, Result};
use json_patch::{Patch, PatchOperation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::patch::apply_operations;
use crate::oci::reference::ImageReference;

/// Reserved file name of the mapping inside the chart root.
pub const IMAGE_MAPPING_FILE: &str = "cg.json";

/// Values file the mapping points into.
pub const VALUES_FILE: &str = "values.yaml";

/// Parsed `cg.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMapping {
    #[serde(default)]
    pub images: BTreeMap<String, ImagePointers>,
}

/// JSON pointers into `values.yaml` for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagePointers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ImageMapping {
    pub fn parse(content: &[u8]) -> Result<Self> {
        serde_json::from_slice(content).map_err(|e| {
            ChartError::ImageMapping(format!("parsing {}: {}", IMAGE_MAPPING_FILE, e))
        })
    }

    /// Patch operations that write `images` (id -> reference) into values.
    pub fn operations(&self, images: &BTreeMap<String, String>) -> Result<Vec<PatchOperation>> {
        let mut ops = Vec::new();
        for (id, raw) in images {
            let pointers = self.images.get(id).ok_or_else(|| {
                ChartError::ImageMapping(format!("image {} is not in the chart's image mapping", id))
            })?;
            let reference = ImageReference::parse(raw).map_err(|e| {
                ChartError::ImageMapping(format!("image {}: {}", id, e))
            })?;

            let fields = [
                (&pointers.registry, Some(reference.registry.clone())),
                (&pointers.repository, Some(reference.repository.clone())),
                (&pointers.tag, reference.tag.clone()),
                (&pointers.digest, reference.digest.clone()),
                (&pointers.reference, Some(reference.full_reference())),
            ];
            for (pointer, value) in fields {
                if let (Some(pointer), Some(value)) = (pointer, value) {
                    ops.push(json!({"op": "add", "path": pointer, "value": value}));
                }
            }
        }

        let patch: Patch = serde_json::from_value(Value::Array(ops))
            .map_err(|e| ChartError::ImageMapping(format!("invalid pointer: {}", e)))?;
        Ok(patch.0)
    }

    /// Rewrite `values.yaml` content with the given image references.
    pub fn resolve(&self, images: &BTreeMap<String, String>, values: &[u8]) -> Result<Vec<u8>> {
        let ops = self.operations(images)?;
        tracing::debug!(images = images.len(), operations = ops.len(), "Resolving image values");
        apply_operations(VALUES_FILE, values, &ops)
    }
}
