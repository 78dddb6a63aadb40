//! apk2oci Runtime - package to Helm chart artifact pipeline.
//!
//! Resolves and fetches APK packages, locates the Helm chart they carry,
//! rewrites it into a chart content layer and assembles the OCI artifact.

#![allow(clippy::result_large_err)]

pub mod apk;
pub mod chart;
pub mod oci;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export common types
pub use apk::{Keyring, PackageFile, PackageQuery, PackageSource, ResolvedPackageSet, Resolver};
pub use chart::{build, publish_chart, ChartBuilder, ChartDescriptor, PublishRequest, PublishedChart};
pub use oci::{write_oci_layout, Artifact, ChartPusher, ImageReference, RegistryAuth, RegistryPusher};

/// apk2oci Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
