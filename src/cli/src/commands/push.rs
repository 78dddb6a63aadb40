//! `apk2oci push` command: build a package's chart and push it by digest.

use apk2oci_runtime::{publish_chart, PublishRequest, RegistryAuth, RegistryPusher};
use clap::Args;

use super::{ContentArgs, RepositoryArgs};

#[derive(Args)]
pub struct PushArgs {
    /// Package name (e.g., "istio-charts-base")
    pub package: String,

    /// Package version constraint; default is the latest
    #[arg(long)]
    pub version: Option<String>,

    /// Target repository (e.g., "ghcr.io/org/charts/base"), without tag
    #[arg(short = 't', long = "to")]
    pub to: String,

    /// Registry host to reach over plain HTTP, can be repeated
    #[arg(long = "insecure-registry")]
    pub insecure_registries: Vec<String>,

    #[command(flatten)]
    pub repository: RepositoryArgs,

    #[command(flatten)]
    pub content: ContentArgs,

    /// Only print the pushed reference
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: PushArgs) -> Result<(), Box<dyn std::error::Error>> {
    let provider = args.repository.provider()?;
    let request = PublishRequest {
        package: args.package.clone(),
        version: args.version.clone(),
        arch: None,
        repository: args.to.clone(),
        patches: args.content.patches()?,
        images: args.content.images()?,
        work_dir: None,
    };

    // Credentials come from REGISTRY_USERNAME / REGISTRY_PASSWORD, else anonymous
    let auth = RegistryAuth::from_env();
    let pusher = if args.insecure_registries.is_empty() {
        RegistryPusher::with_auth(auth)
    } else {
        RegistryPusher::insecure(auth, args.insecure_registries.clone())
    };

    if !args.quiet {
        println!("Pushing {} to {}...", args.package, args.to);
    }

    let published = publish_chart(&request, &provider, &pusher).await?;

    if args.quiet {
        println!("{}", published.id);
    } else {
        println!(
            "Pushed: {} {} ({})",
            published.name, published.version, published.id
        );
    }
    Ok(())
}
