//! Finding the chart inside a package's data segment.

use std::collections::BTreeMap;
use std::io::Read;

use apk2oci_core::error::{ChartError, Result};
use flate2::read::GzDecoder;

use super::descriptor::ChartDescriptor;
use super::images::{ImageMapping, IMAGE_MAPPING_FILE};
use crate::apk::expand::PackageSegments;

/// File name of the chart descriptor.
pub const CHART_DESCRIPTOR_FILE: &str = "Chart.yaml";

/// The chart embedded in a package.
#[derive(Debug, Clone)]
pub struct ChartRoot {
    /// Top-level directory holding `Chart.yaml`
    pub name: String,
    /// Compressed data segment (gzip'd tar)
    pub data: Vec<u8>,
    /// Parsed `cg.json`, when the chart ships one
    pub mapping: Option<ImageMapping>,
    /// Descriptor as shipped, before any patch
    pub descriptor: ChartDescriptor,
}

impl ChartRoot {
    /// Locate the chart in a split package.
    pub fn locate(segments: &PackageSegments) -> Result<Self> {
        Self::from_data(segments.data().compressed().to_vec())
    }

    /// Locate the chart in a compressed data segment.
    ///
    /// Only `<dir>/Chart.yaml` with a single path component before it
    /// counts; nested descriptors belong to subcharts.
    pub fn from_data(data: Vec<u8>) -> Result<Self> {
        let mut descriptors: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut mappings: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        let mut archive = tar::Archive::new(GzDecoder::new(data.as_slice()));
        let entries = archive
            .entries()
            .map_err(|e| ChartError::Decomposition(format!("reading data segment: {}", e)))?;
        for entry in entries {
            let mut entry = entry
                .map_err(|e| ChartError::Decomposition(format!("reading data segment: {}", e)))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .map_err(|e| ChartError::Decomposition(format!("reading data segment: {}", e)))?
                .to_string_lossy()
                .into_owned();
            let name = name.strip_prefix("./").unwrap_or(&name).to_string();

            let Some((dir, file)) = name.split_once('/') else {
                continue;
            };
            if dir.is_empty() || file.contains('/') {
                continue;
            }
            let target = match file {
                CHART_DESCRIPTOR_FILE => &mut descriptors,
                IMAGE_MAPPING_FILE => &mut mappings,
                _ => continue,
            };
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| ChartError::Decomposition(format!("reading {}: {}", name, e)))?;
            target.insert(dir.to_string(), content);
        }

        let mut roots = descriptors.into_iter();
        let (name, descriptor) = match (roots.next(), roots.next()) {
            (Some(root), None) => root,
            (None, _) => {
                return Err(ChartError::ChartNotFound(format!(
                    "no top-level {} in data segment",
                    CHART_DESCRIPTOR_FILE
                )))
            }
            (Some((first, _)), Some((second, _))) => {
                return Err(ChartError::ChartNotFound(format!(
                    "ambiguous chart root: both {} and {} hold a {}",
                    first, second, CHART_DESCRIPTOR_FILE
                )))
            }
        };

        let descriptor = ChartDescriptor::from_yaml(&descriptor)?;
        let mapping = mappings
            .remove(&name)
            .map(|content| ImageMapping::parse(&content))
            .transpose()?;

        tracing::debug!(
            root = %name,
            chart = %descriptor.name,
            version = %descriptor.version,
            image_mapping = mapping.is_some(),
            "Located chart root"
        );

        Ok(Self {
            name,
            data,
            mapping,
            descriptor,
        })
    }
}
