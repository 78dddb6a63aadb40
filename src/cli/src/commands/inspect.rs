//! `apk2oci inspect` command: display chart metadata and manifest as JSON.

use std::path::PathBuf;

use apk2oci_runtime::ChartBuilder;
use clap::Args;

use super::ContentArgs;

#[derive(Args)]
pub struct InspectArgs {
    /// Path to a chart package (.apk)
    pub file: PathBuf,

    #[command(flatten)]
    pub content: ContentArgs,
}

pub async fn execute(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let builder = ChartBuilder::new(&args.file)?
        .with_patches(args.content.patches()?)
        .with_images(args.content.images()?);

    let result = builder.metadata().and_then(|chart| Ok((chart, builder.artifact()?)));
    builder.cleanup()?;
    let (chart, artifact) = result?;

    let manifest: serde_json::Value = serde_json::from_slice(artifact.raw_manifest())?;
    let layers: Vec<serde_json::Value> = artifact
        .layers()
        .iter()
        .map(|layer| {
            serde_json::json!({
                "Digest": layer.digest(),
                "DiffID": layer.diff_id(),
                "Size": layer.size(),
            })
        })
        .collect();
    let output = serde_json::json!({
        "Chart": chart,
        "Digest": artifact.digest(),
        "Size": artifact.size(),
        "Layers": layers,
        "Manifest": manifest,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
