//! Trusted repository keys and index signature verification.
//!
//! Signed archives start with a gzip member holding a single
//! `.SIGN.RSA.<key-name>` (SHA-1) or `.SIGN.RSA256.<key-name>` (SHA-256)
//! entry: an RSA PKCS#1 v1.5 signature over the compressed bytes of the
//! following member. Keys are matched by file name.

use std::path::{Path, PathBuf};

use apk2oci_core::error::{ChartError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::signature::{
    UnparsedPublicKey, VerificationAlgorithm, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
    RSA_PKCS1_2048_8192_SHA256,
};

use super::expand::PackageSegments;

const SIGN_RSA256_PREFIX: &str = ".SIGN.RSA256.";
const SIGN_RSA_PREFIX: &str = ".SIGN.RSA.";

/// A trusted RSA public key.
#[derive(Debug, Clone)]
pub struct TrustedKey {
    /// Key file name, as referenced by signature entries
    pub name: String,
    /// PKCS#1 `RSAPublicKey` DER
    der: Vec<u8>,
}

impl TrustedKey {
    /// Parse a PEM key (`PUBLIC KEY` SPKI or `RSA PUBLIC KEY` PKCS#1).
    pub fn from_pem(name: impl Into<String>, pem: &str) -> Result<Self> {
        let name = name.into();
        let mut label = None;
        let mut body = String::new();
        for line in pem.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("-----BEGIN ") {
                label = rest.strip_suffix("-----").map(str::to_string);
            } else if line.starts_with("-----END ") {
                break;
            } else if label.is_some() {
                body.push_str(line);
            }
        }

        let label = label.ok_or_else(|| {
            ChartError::Resolution(format!("key {} is not PEM encoded", name))
        })?;
        let der = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| ChartError::Resolution(format!("key {}: invalid base64: {}", name, e)))?;

        let der = match label.as_str() {
            "RSA PUBLIC KEY" => der,
            "PUBLIC KEY" => {
                let spki = spki::SubjectPublicKeyInfoRef::try_from(der.as_slice()).map_err(|e| {
                    ChartError::Resolution(format!("key {}: invalid SPKI: {}", name, e))
                })?;
                spki.subject_public_key.raw_bytes().to_vec()
            }
            other => {
                return Err(ChartError::Resolution(format!(
                    "key {}: unsupported PEM label '{}'",
                    name, other
                )))
            }
        };

        Ok(Self { name, der })
    }

    fn verify(&self, algorithm: &'static dyn VerificationAlgorithm, message: &[u8], signature: &[u8]) -> Result<()> {
        UnparsedPublicKey::new(algorithm, &self.der)
            .verify(message, signature)
            .map_err(|_| {
                ChartError::Resolution(format!(
                    "signature verification failed for key {}",
                    self.name
                ))
            })
    }
}

/// The set of keys a build trusts.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: Vec<TrustedKey>,
}

impl Keyring {
    pub fn new(keys: Vec<TrustedKey>) -> Self {
        Self { keys }
    }

    /// Load PEM key files; each key is named after its file name.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut keys = Vec::with_capacity(paths.len());
        for path in paths {
            keys.push(load_key(path)?);
        }
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TrustedKey> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// Check the signature member of a split archive.
    ///
    /// With `allow_untrusted`, unsigned archives and unknown signers are
    /// accepted (and logged).
    pub fn verify(&self, segments: &PackageSegments, source: &str, allow_untrusted: bool) -> Result<()> {
        let signature = match find_signature(segments)? {
            Some(signature) => signature,
            None if allow_untrusted => {
                tracing::warn!(source, "Accepting unsigned index");
                return Ok(());
            }
            None => {
                return Err(ChartError::Resolution(format!(
                    "index {} is not signed",
                    source
                )))
            }
        };

        let Some(key) = self.get(&signature.key_name) else {
            if allow_untrusted {
                tracing::warn!(source, key = %signature.key_name, "Accepting index signed by untrusted key");
                return Ok(());
            }
            return Err(ChartError::Resolution(format!(
                "index {} is signed by untrusted key {}",
                source, signature.key_name
            )));
        };

        // The signed member directly follows the signature member.
        let signed = &segments.segments()[1];
        key.verify(signature.algorithm, signed.compressed(), &signature.bytes)?;
        tracing::debug!(source, key = %key.name, "Verified index signature");
        Ok(())
    }
}

fn load_key(path: &Path) -> Result<TrustedKey> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ChartError::ConfigError(format!("invalid key path {}", path.display())))?;
    let pem = std::fs::read_to_string(path).map_err(|e| {
        ChartError::ConfigError(format!("Failed to read key {}: {}", path.display(), e))
    })?;
    TrustedKey::from_pem(name, &pem)
}

struct Signature {
    key_name: String,
    algorithm: &'static dyn VerificationAlgorithm,
    bytes: Vec<u8>,
}

fn find_signature(segments: &PackageSegments) -> Result<Option<Signature>> {
    if segments.len() < 2 {
        return Ok(None);
    }
    let first = &segments.segments()[0];
    for name in first.entry_names()? {
        let (key_name, algorithm): (&str, &'static dyn VerificationAlgorithm) =
            if let Some(key) = name.strip_prefix(SIGN_RSA256_PREFIX) {
                (key, &RSA_PKCS1_2048_8192_SHA256)
            } else if let Some(key) = name.strip_prefix(SIGN_RSA_PREFIX) {
                (key, &RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY)
            } else {
                continue;
            };
        let bytes = first.read_entry(&name)?.unwrap_or_default();
        return Ok(Some(Signature {
            key_name: key_name.to_string(),
            algorithm,
            bytes,
        }));
    }
    Ok(None)
}
