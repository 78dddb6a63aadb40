//! APK package handling.
//!
//! Provides version ordering, APKINDEX parsing, signature verification,
//! dependency resolution, package download and stream decomposition.

pub mod expand;
pub mod fetch;
pub mod index;
pub mod keyring;
pub mod repository;
pub mod resolver;
pub mod version;

pub use expand::{PackageSegments, Segment};
pub use fetch::{fetch_package_file, fetch_package_file_in, open_package, PackageFile};
pub use index::{parse_index, read_index, IndexEntry};
pub use keyring::{Keyring, TrustedKey};
pub use repository::{
    open_source, HttpRepository, LocalRepository, PackageReader, PackageSource, RepositoryIndex,
};
pub use resolver::{PackageQuery, ResolvedPackage, ResolvedPackageSet, Resolver};
pub use version::{Constraint, Dependency, Op, Version};
