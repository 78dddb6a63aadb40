//! CLI command definitions and dispatch.

mod build;
mod inspect;
mod push;

use std::collections::BTreeMap;
use std::path::PathBuf;

use apk2oci_core::{Arch, BuildConfig, ProviderConfig};
use clap::{Args, Parser, Subcommand};

/// apk2oci: turn chart packages into Helm OCI artifacts.
#[derive(Parser)]
#[command(name = "apk2oci", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Build the chart artifact for a package
    Build(build::BuildArgs),
    /// Build the chart artifact and push it to a registry
    Push(push::PushArgs),
    /// Show chart metadata and manifest of a local .apk file
    Inspect(inspect::InspectArgs),
}

/// Where packages come from.
#[derive(Args, Debug, Clone, Default)]
pub struct RepositoryArgs {
    /// Package repository (directory or http(s) URL), can be repeated
    #[arg(short = 'r', long = "repository")]
    pub repositories: Vec<String>,

    /// Trusted repository public key file, can be repeated
    #[arg(short = 'k', long = "key")]
    pub keys: Vec<PathBuf>,

    /// Target architecture (apk or OCI name)
    #[arg(short = 'a', long)]
    pub arch: Option<String>,

    /// Accept repository indexes without a trusted signature
    #[arg(long)]
    pub allow_untrusted: bool,

    /// Provider configuration file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

impl RepositoryArgs {
    /// Provider defaults: environment, then config file, then flags.
    pub fn provider(&self) -> Result<ProviderConfig, Box<dyn std::error::Error>> {
        let mut provider = ProviderConfig::from_env();
        if let Some(path) = &self.config {
            provider = provider.merge(ProviderConfig::from_file(path)?);
        }
        provider = provider.merge(ProviderConfig {
            package_repositories: self.repositories.clone(),
            public_keys: self.keys.clone(),
            default_arch: self.arch()?,
            allow_untrusted: self.allow_untrusted,
        });
        provider.validate()?;
        Ok(provider)
    }

    fn arch(&self) -> Result<Option<Arch>, Box<dyn std::error::Error>> {
        Ok(self.arch.as_deref().map(str::parse::<Arch>).transpose()?)
    }
}

/// How the chart is rewritten.
#[derive(Args, Debug, Clone, Default)]
pub struct ContentArgs {
    /// Patch a chart file: PATH=PATCH_FILE (RFC 6902 JSON), can be repeated
    #[arg(short = 'p', long = "patch")]
    pub patches: Vec<String>,

    /// Set an image of the chart's image mapping: ID=REFERENCE, can be repeated
    #[arg(short = 'i', long = "image")]
    pub images: Vec<String>,
}

impl ContentArgs {
    /// Relative chart path -> patch document, read from the named files.
    pub fn patches(&self) -> Result<BTreeMap<String, Vec<u8>>, Box<dyn std::error::Error>> {
        let mut patches = BTreeMap::new();
        for raw in &self.patches {
            let (path, file) = BuildConfig::parse_assignment(raw)?;
            let document = std::fs::read(&file)
                .map_err(|e| format!("Failed to read patch file '{}': {}", file, e))?;
            if patches.insert(path.clone(), document).is_some() {
                return Err(format!("more than one patch for '{}'", path).into());
            }
        }
        Ok(patches)
    }

    /// Image id -> reference.
    pub fn images(&self) -> Result<BTreeMap<String, String>, Box<dyn std::error::Error>> {
        self.images
            .iter()
            .map(|raw| BuildConfig::parse_assignment(raw).map_err(Into::into))
            .collect()
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build(args) => build::execute(args).await,
        Command::Push(args) => push::execute(args).await,
        Command::Inspect(args) => inspect::execute(args).await,
    }
}
