//! Chart descriptor (`Chart.yaml`) model.
//!
//! Field order and naming follow Helm's chart metadata so the serialized
//! config blob is what Helm clients expect. Empty fields are omitted.

use std::collections::BTreeMap;

use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::media::annotations;
use serde::{Deserialize, Deserializer, Serialize};

/// Version used when `Chart.yaml` does not carry one.
pub const DEFAULT_CHART_VERSION: &str = "0.1.0";

/// Helm chart metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    pub app_version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub chart_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// A chart dependency entry of `Chart.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    #[serde(
        default,
        rename = "import-values",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub import_values: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
}

impl ChartDescriptor {
    /// Parse `Chart.yaml` content, defaulting the version.
    pub fn from_yaml(content: &[u8]) -> Result<Self> {
        let mut descriptor: ChartDescriptor = serde_yaml::from_slice(content)
            .map_err(|e| ChartError::Manifest(format!("failed to parse Chart.yaml: {}", e)))?;
        if descriptor.version.is_empty() {
            descriptor.version = DEFAULT_CHART_VERSION.to_string();
        }
        Ok(descriptor)
    }

    /// Canonical JSON form, used as the artifact's config blob.
    pub fn to_config_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ChartError::Manifest(format!("failed to serialize chart config: {}", e)))
    }

    /// Manifest annotations derived from the descriptor.
    ///
    /// Title, version and description mirror the non-empty descriptor
    /// fields; the source is the first source URL. Chart annotations fill
    /// in remaining keys only.
    pub fn manifest_annotations(&self) -> BTreeMap<String, String> {
        let derived = [
            (annotations::TITLE, self.name.as_str()),
            (annotations::VERSION, self.version.as_str()),
            (annotations::DESCRIPTION, self.description.as_str()),
            (
                annotations::SOURCE,
                self.sources.first().map(String::as_str).unwrap_or_default(),
            ),
        ];
        let mut out: BTreeMap<String, String> = derived
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        for (key, value) in &self.annotations {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }
        out
    }
}

/// YAML authors write `version: 1.0`; keep it as text.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Null,
    }

    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Text(s)) => s,
        Some(Scalar::Int(i)) => i.to_string(),
        Some(Scalar::Float(f)) => f.to_string(),
        Some(Scalar::Null) | None => String::new(),
    })
}
