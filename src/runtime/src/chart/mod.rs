//! Helm chart handling.
//!
//! Locates the chart inside a package's data segment, rewrites it into a
//! single content layer (patches, image references, `var/` exclusion) and
//! drives the build and publish flows.

pub mod build;
pub mod builder;
pub mod descriptor;
pub mod images;
pub mod layer;
pub mod locator;
pub mod patch;
pub mod publish;

pub use build::{build, resolve_package};
pub use builder::ChartBuilder;
pub use descriptor::{ChartDescriptor, DEFAULT_CHART_VERSION};
pub use images::{ImageMapping, ImagePointers, IMAGE_MAPPING_FILE};
pub use layer::{build_layer, ChartLayer, EXCLUDED_DIR};
pub use locator::{ChartRoot, CHART_DESCRIPTOR_FILE};
pub use patch::apply_patch;
pub use publish::{publish_chart, PublishRequest, PublishedChart};
