//! OCI artifact support.
//!
//! ```text
//! manifest (application/vnd.oci.image.manifest.v1+json)
//! ├── config  application/vnd.cncf.helm.config.v1+json         serialized Chart.yaml
//! └── layers
//!     └── [0] application/vnd.cncf.helm.chart.content.v1.tar+gzip  <chart-root>/...
//! ```

pub mod artifact;
pub mod digest;
pub mod layout;
pub mod reference;
pub mod registry;

pub use artifact::{Artifact, Descriptor, Layer, Manifest};
pub use digest::{sha256_digest, sha256_hex};
pub use layout::write_oci_layout;
pub use reference::ImageReference;
pub use registry::{ChartPusher, RegistryAuth, RegistryPusher};
