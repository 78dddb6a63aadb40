//! Content layer construction.
//!
//! Rewrites the package's data segment into the chart content layer:
//! entries outside the chart root are dropped, targeted files are patched
//! and the chart descriptor is re-read from the rewritten bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::media::CHART_LAYER_MEDIA_TYPE;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};

use super::descriptor::ChartDescriptor;
use super::images::VALUES_FILE;
use super::locator::{ChartRoot, CHART_DESCRIPTOR_FILE};
use super::patch::apply_patch;
use crate::oci::artifact::Layer;
use crate::oci::digest::sha256_digest;

/// Directory holding ephemeral runtime state; never shipped.
pub const EXCLUDED_DIR: &str = "var";

/// Output of the rewrite pass.
#[derive(Debug, Clone)]
pub struct ChartLayer {
    pub layer: Layer,
    /// Descriptor as re-read from the (possibly patched) `Chart.yaml`
    pub descriptor: ChartDescriptor,
}

fn layer_error(context: &str, e: impl std::fmt::Display) -> ChartError {
    ChartError::Decomposition(format!("{}: {}", context, e))
}

fn is_excluded(path: &str) -> bool {
    path == EXCLUDED_DIR
        || path
            .strip_prefix(EXCLUDED_DIR)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Build the content layer for a located chart.
///
/// `patches` maps chart-relative paths to raw patch documents; `images`
/// maps image ids of the chart's image mapping to references written into
/// `values.yaml`.
pub fn build_layer(
    root: &ChartRoot,
    patches: &BTreeMap<String, Vec<u8>>,
    images: &BTreeMap<String, String>,
) -> Result<ChartLayer> {
    let mapping = match (&root.mapping, images.is_empty()) {
        (_, true) => None,
        (Some(mapping), false) => Some(mapping),
        (None, false) => {
            tracing::warn!(
                chart = %root.name,
                images = images.len(),
                "Chart has no image mapping, leaving values untouched"
            );
            None
        }
    };

    let prefix = format!("{}/", root.name);
    let mut pending: BTreeSet<&str> = patches.keys().map(String::as_str).collect();
    let mut descriptor = None;
    let mut values_seen = false;

    let mut builder = tar::Builder::new(Vec::new());
    let mut archive = tar::Archive::new(GzDecoder::new(root.data.as_slice()));
    let entries = archive
        .entries()
        .map_err(|e| layer_error("reading data segment", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| layer_error("reading data segment", e))?;
        let path = entry
            .path()
            .map_err(|e| layer_error("reading entry path", e))?
            .to_string_lossy()
            .into_owned();
        let path = path.strip_prefix("./").unwrap_or(&path).to_string();

        // Archive-level `var/` lies outside any other chart root.
        let relative = if path == root.name || path == prefix {
            ""
        } else if let Some(rest) = path.strip_prefix(&prefix) {
            rest.trim_end_matches('/')
        } else {
            continue;
        };
        if is_excluded(relative) {
            continue;
        }

        let mut header = entry.header().clone();
        let entry_type = header.entry_type();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .map_err(|e| layer_error("reading link target", e))?
                .ok_or_else(|| ChartError::Decomposition(format!("link {} has no target", path)))?
                .into_owned();
            builder
                .append_link(&mut header, &path, target)
                .map_err(|e| layer_error("writing layer", e))?;
            continue;
        }

        let is_descriptor = relative == CHART_DESCRIPTOR_FILE;
        let is_values = relative == VALUES_FILE && mapping.is_some();
        let patch = patches.get(relative);
        if !entry_type.is_file() || !(is_descriptor || is_values || patch.is_some()) {
            builder
                .append_data(&mut header, &path, &mut entry)
                .map_err(|e| layer_error("writing layer", e))?;
            continue;
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| layer_error(&format!("reading {}", path), e))?;

        if let Some(document) = patch {
            content = apply_patch(relative, &content, document)?;
            pending.remove(relative);
            tracing::debug!(file = relative, "Patched chart file");
        }
        if is_values {
            if let Some(mapping) = mapping {
                content = mapping.resolve(images, &content)?;
                values_seen = true;
            }
        }
        if is_descriptor {
            descriptor = Some(ChartDescriptor::from_yaml(&content)?);
        }

        header.set_size(content.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, &path, content.as_slice())
            .map_err(|e| layer_error("writing layer", e))?;
    }

    let descriptor = descriptor.ok_or(ChartError::DescriptorNotFound)?;
    if mapping.is_some() && !values_seen {
        return Err(ChartError::ImageMapping(format!(
            "chart {} has no {} to write images into",
            root.name, VALUES_FILE
        )));
    }
    for missing in pending {
        tracing::warn!(file = missing, "Patch target not found in chart");
    }

    let tar = builder
        .into_inner()
        .map_err(|e| layer_error("finishing layer", e))?;
    let diff_id = sha256_digest(&tar);

    // Zero mtime and no file name keep the gzip header reproducible.
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::default());
    encoder
        .write_all(&tar)
        .map_err(|e| layer_error("compressing layer", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| layer_error("compressing layer", e))?;

    let layer = Layer::new(CHART_LAYER_MEDIA_TYPE, compressed, diff_id);
    tracing::info!(
        chart = %descriptor.name,
        version = %descriptor.version,
        digest = %layer.digest(),
        size = layer.size(),
        "Built chart content layer"
    );

    Ok(ChartLayer { layer, descriptor })
}
