//! apk2oci Core - Foundational Types
//!
//! Errors, configuration, architectures and media types shared by the
//! runtime pipeline and the CLI.

pub mod arch;
pub mod config;
pub mod error;
pub mod media;

// Re-export commonly used types
pub use arch::{Arch, DEFAULT_ARCH};
pub use config::{BuildConfig, ProviderConfig};
pub use error::{ChartError, Result};

/// apk2oci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
