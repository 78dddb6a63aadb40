//! OCI reference parsing.
//!
//! Image references (`ghcr.io/org/app:1.2@sha256:...`) feed the chart's
//! image mapping; repository references (`ghcr.io/org/charts/base`) are
//! push targets, which are always addressed by digest.

use apk2oci_core::error::{ChartError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag, when given
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123..."), when given
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `ghcr.io/org/image:tag@sha256:abc...`
    /// - `localhost:5000/org/image`
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ChartError::ConfigError("Empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.split_once('@') {
            Some((name_tag, digest)) => {
                if !digest.contains(':') || digest.ends_with(':') {
                    return Err(ChartError::ConfigError(format!(
                        "Invalid digest format in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name_tag, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag colon can only follow the last path separator; earlier
        // colons belong to a registry port.
        let last_segment = name_tag.rfind('/').map(|pos| pos + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_segment..].rfind(':') {
            Some(pos) => {
                let split = last_segment + pos;
                let tag = &name_tag[split + 1..];
                if tag.is_empty() {
                    return Err(ChartError::ConfigError(format!(
                        "Empty tag in reference '{}'",
                        reference
                    )));
                }
                (&name_tag[..split], Some(tag.to_string()))
            }
            None => (name_tag, None),
        };

        let (registry, repository) = split_registry_repository(name, reference)?;

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Parse a push target: registry and repository only.
    pub fn parse_repository(reference: &str) -> Result<Self> {
        let parsed = Self::parse(reference)?;
        if parsed.tag.is_some() || parsed.digest.is_some() {
            return Err(ChartError::ConfigError(format!(
                "repository '{}' must not carry a tag or digest",
                reference
            )));
        }
        Ok(parsed)
    }

    /// `registry/repository`, without tag or digest.
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// The same repository, pinned to `digest`.
    pub fn with_digest(&self, digest: impl Into<String>) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.into()),
        }
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.repository_path();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Split a name into registry and repository components.
///
/// The first component is a registry when it looks like a hostname
/// (contains a dot or colon, or is "localhost").
fn split_registry_repository(name: &str, reference: &str) -> Result<(String, String)> {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(ChartError::ConfigError(format!(
                    "Empty repository in reference '{}'",
                    reference
                )));
            }
            return Ok((first.to_string(), rest.to_string()));
        }
    }

    if name.is_empty() {
        return Err(ChartError::ConfigError(format!(
            "Empty repository in reference '{}'",
            reference
        )));
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };
    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse("cgr.dev/chainguard/istio-pilot:1.20.3@sha256:abc123").unwrap();
        assert_eq!(r.registry, "cgr.dev");
        assert_eq!(r.repository, "chainguard/istio-pilot");
        assert_eq!(r.tag.as_deref(), Some("1.20.3"));
        assert_eq!(r.digest.as_deref(), Some("sha256:abc123"));
        assert_eq!(
            r.to_string(),
            "cgr.dev/chainguard/istio-pilot:1.20.3@sha256:abc123"
        );
    }

    #[test]
    fn test_parse_registry_port() {
        let r = ImageReference::parse("localhost:5000/charts/base").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "charts/base");
        assert_eq!(r.tag, None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("nginx@abc").is_err());
        assert!(ImageReference::parse("nginx:").is_err());
        assert!(ImageReference::parse("ghcr.io/").is_err());
    }

    #[test]
    fn test_parse_repository_target() {
        let r = ImageReference::parse_repository("ttl.sh/charts/istio-base").unwrap();
        assert_eq!(r.repository_path(), "ttl.sh/charts/istio-base");
        assert!(ImageReference::parse_repository("ttl.sh/charts/istio-base:1h").is_err());

        let pinned = r.with_digest("sha256:feed");
        assert_eq!(pinned.to_string(), "ttl.sh/charts/istio-base@sha256:feed");
    }
}
