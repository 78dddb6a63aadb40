//! OCI image-layout export.
//!
//! ```text
//! <dir>/
//! ├── oci-layout
//! ├── index.json
//! └── blobs/sha256/<manifest, config, layer>
//! ```

use std::path::Path;

use apk2oci_core::error::{ChartError, Result};
use serde_json::json;

use super::artifact::Artifact;
use super::digest::digest_hex;

/// Write `artifact` as an OCI image layout under `dir`.
///
/// `tag`, when given, is recorded as the `org.opencontainers.image.ref.name`
/// annotation of the index entry.
pub fn write_oci_layout(artifact: &Artifact, dir: &Path, tag: Option<&str>) -> Result<()> {
    let blobs_dir = dir.join("blobs").join("sha256");
    std::fs::create_dir_all(&blobs_dir).map_err(|e| {
        ChartError::Other(format!(
            "Failed to create blobs directory {}: {}",
            blobs_dir.display(),
            e
        ))
    })?;

    let write_blob = |digest: &str, data: &[u8]| -> Result<()> {
        std::fs::write(blobs_dir.join(digest_hex(digest)), data).map_err(|e| {
            ChartError::Other(format!("Failed to write blob {}: {}", digest, e))
        })
    };
    write_blob(artifact.digest(), artifact.raw_manifest())?;
    write_blob(artifact.config_name(), artifact.raw_config())?;
    for layer in artifact.layers() {
        write_blob(layer.digest(), layer.data())?;
    }

    std::fs::write(
        dir.join("oci-layout"),
        r#"{"imageLayoutVersion":"1.0.0"}"#,
    )?;

    let mut entry = json!({
        "mediaType": artifact.media_type(),
        "digest": artifact.digest(),
        "size": artifact.size(),
    });
    if let Some(tag) = tag {
        entry["annotations"] = json!({ "org.opencontainers.image.ref.name": tag });
    }
    let index = json!({
        "schemaVersion": 2,
        "manifests": [entry],
    });
    std::fs::write(dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;

    tracing::info!(dir = %dir.display(), digest = %artifact.digest(), "Wrote OCI layout");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::descriptor::ChartDescriptor;
    use crate::oci::artifact::Layer;
    use crate::oci::digest::sha256_digest;
    use apk2oci_core::media::CHART_LAYER_MEDIA_TYPE;

    #[test]
    fn test_write_layout() {
        let chart = ChartDescriptor::from_yaml(b"name: base\n").unwrap();
        let layer = Layer::new(CHART_LAYER_MEDIA_TYPE, b"gz".to_vec(), sha256_digest(b"tar"));
        let artifact = Artifact::new(&chart, layer).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        write_oci_layout(&artifact, tmp.path(), Some("0.1.0")).unwrap();

        let blobs = tmp.path().join("blobs/sha256");
        assert_eq!(
            std::fs::read(blobs.join(digest_hex(artifact.digest()))).unwrap(),
            artifact.raw_manifest()
        );
        assert!(blobs.join(digest_hex(artifact.config_name())).exists());
        assert_eq!(
            std::fs::read(blobs.join(digest_hex(&sha256_digest(b"gz")))).unwrap(),
            b"gz"
        );

        let index: serde_json::Value =
            serde_json::from_slice(&std::fs::read(tmp.path().join("index.json")).unwrap()).unwrap();
        assert_eq!(index["manifests"][0]["digest"], artifact.digest());
        assert_eq!(
            index["manifests"][0]["annotations"]["org.opencontainers.image.ref.name"],
            "0.1.0"
        );
        assert!(tmp.path().join("oci-layout").exists());
    }
}
