//! apk2oci CLI - turn chart packages into Helm OCI artifacts.

pub mod commands;
