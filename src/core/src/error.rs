use std::sync::Arc;

use thiserror::Error;

/// apk2oci error types
///
/// Every variant is terminal for the build invocation that produced it.
/// The type is `Clone` so a lazily-initialised builder can hand the same
/// first error to every later caller.
#[derive(Error, Debug, Clone)]
pub enum ChartError {
    /// No repository entry provides the requested name
    #[error("nothing provides {name} (arch {arch})")]
    NothingProvides { name: String, arch: String },

    /// Entries exist but none matches the version constraint
    #[error("package {name}: available version set [{available}] does not satisfy constraint {constraint}")]
    Unsatisfiable {
        name: String,
        constraint: String,
        available: String,
    },

    /// Jointly unsatisfiable dependency constraints
    #[error("package conflicts detected: {}", .0.join("; "))]
    Conflicts(Vec<String>),

    /// Index, keyring or signature failure while resolving
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Package download failed
    #[error("failed to download package {package}: {message}")]
    Fetch { package: String, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or truncated package stream
    #[error("failed to decompose package stream: {0}")]
    Decomposition(String),

    /// No top-level chart descriptor in the package
    #[error("package is missing chart descriptor: {0}")]
    ChartNotFound(String),

    /// The rewrite pass never saw the chart descriptor
    #[error("chart descriptor not found after rewrite")]
    DescriptorNotFound,

    /// Patch decode or apply failure
    #[error("error applying patch to file {path}: {message}")]
    Patch { path: String, message: String },

    /// Image mapping side channel failure
    #[error("Image mapping error: {0}")]
    ImageMapping(String),

    /// Manifest serialization or digest failure
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(Arc<std::io::Error>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ChartError {
    /// Build a patch error for a chart-relative file.
    pub fn patch(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ChartError::Patch {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error came from dependency resolution.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ChartError::NothingProvides { .. }
                | ChartError::Unsatisfiable { .. }
                | ChartError::Conflicts(_)
                | ChartError::Resolution(_)
        )
    }
}

impl From<std::io::Error> for ChartError {
    fn from(err: std::io::Error) -> Self {
        ChartError::IoError(Arc::new(err))
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(err: serde_json::Error) -> Self {
        ChartError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChartError {
    fn from(err: serde_yaml::Error) -> Self {
        ChartError::SerializationError(err.to_string())
    }
}

/// Result type alias for apk2oci operations
pub type Result<T> = std::result::Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_provides_display() {
        let error = ChartError::NothingProvides {
            name: "non-existent-package".to_string(),
            arch: "aarch64".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "nothing provides non-existent-package (arch aarch64)"
        );
    }

    #[test]
    fn test_unsatisfiable_display() {
        let error = ChartError::Unsatisfiable {
            name: "istio-charts-base".to_string(),
            constraint: "=9999.9.9-r0".to_string(),
            available: "1.20.3-r0".to_string(),
        };
        assert!(error.to_string().contains("does not satisfy"));
        assert!(error.to_string().contains("=9999.9.9-r0"));
    }

    #[test]
    fn test_conflicts_display() {
        let error = ChartError::Conflicts(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "package conflicts detected: a; b");
    }

    #[test]
    fn test_patch_error_names_path() {
        let error = ChartError::patch("templates/values.json", "missing member");
        assert_eq!(
            error.to_string(),
            "error applying patch to file templates/values.json: missing member"
        );
    }

    #[test]
    fn test_decomposition_display() {
        let error = ChartError::Decomposition("truncated gzip member".to_string());
        assert_eq!(
            error.to_string(),
            "failed to decompose package stream: truncated gzip member"
        );
    }

    #[test]
    fn test_descriptor_not_found_display() {
        assert_eq!(
            ChartError::DescriptorNotFound.to_string(),
            "chart descriptor not found after rewrite"
        );
    }

    #[test]
    fn test_registry_error_display() {
        let error = ChartError::RegistryError {
            registry: "ghcr.io".to_string(),
            message: "Authentication failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry error: ghcr.io - Authentication failed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let chart_error: ChartError = io_error.into();
        assert!(matches!(chart_error, ChartError::IoError(_)));
        assert!(chart_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_io_error_is_cloneable() {
        let chart_error: ChartError =
            std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        let cloned = chart_error.clone();
        assert_eq!(chart_error.to_string(), cloned.to_string());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let chart_error: ChartError = result.unwrap_err().into();
        assert!(matches!(chart_error, ChartError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let chart_error: ChartError = result.unwrap_err().into();
        assert!(matches!(chart_error, ChartError::SerializationError(_)));
    }

    #[test]
    fn test_is_resolution() {
        assert!(ChartError::Conflicts(vec![]).is_resolution());
        assert!(!ChartError::DescriptorNotFound.is_resolution());
    }
}
