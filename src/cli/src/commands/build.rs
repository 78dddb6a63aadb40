//! `apk2oci build` command: build the chart artifact for a package.
//!
//! Resolves the package against the configured repositories, rewrites
//! its chart and prints the manifest digest. With `--output`, the
//! artifact is also written as an OCI image layout.

use std::path::PathBuf;

use apk2oci_core::BuildConfig;
use apk2oci_core::media::annotations;
use clap::Args;

use super::{ContentArgs, RepositoryArgs};

#[derive(Args)]
pub struct BuildArgs {
    /// Package name (e.g., "istio-charts-base")
    pub package: String,

    /// Package version constraint (e.g., "1.20.3-r0", ">=1.20"); default is the latest
    #[arg(long)]
    pub version: Option<String>,

    #[command(flatten)]
    pub repository: RepositoryArgs,

    #[command(flatten)]
    pub content: ContentArgs,

    /// Write the artifact as an OCI image layout into this directory
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Print the manifest instead of the digest
    #[arg(long)]
    pub manifest: bool,
}

impl BuildArgs {
    pub(super) fn build_config(&self) -> Result<BuildConfig, Box<dyn std::error::Error>> {
        let provider = self.repository.provider()?;
        Ok(BuildConfig {
            version: self.version.clone(),
            patches: self.content.patches()?,
            images: self.content.images()?,
            ..BuildConfig::from_provider(&provider, None)
        })
    }
}

pub async fn execute(args: BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.build_config()?;
    let artifact = apk2oci_runtime::build(&args.package, &config).await?;

    if let Some(dir) = &args.output {
        let tag = artifact.manifest().annotations.get(annotations::VERSION);
        apk2oci_runtime::write_oci_layout(&artifact, dir, tag.map(String::as_str))?;
    }

    if args.manifest {
        let manifest: serde_json::Value = serde_json::from_slice(artifact.raw_manifest())?;
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        println!("{}", artifact.digest());
    }
    Ok(())
}
