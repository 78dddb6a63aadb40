//! Content digests.

use sha2::{Digest, Sha256};

/// Algorithm prefix of every digest this crate produces.
pub const SHA256_PREFIX: &str = "sha256:";

/// Compute SHA256 digest of raw bytes (hex string, no prefix).
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the `sha256:<hex>` digest of raw bytes.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("{}{}", SHA256_PREFIX, sha256_hex(data))
}

/// Hex part of a `sha256:` digest.
pub fn digest_hex(digest: &str) -> &str {
    digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_hex() {
        assert_eq!(digest_hex("sha256:abc"), "abc");
        assert_eq!(digest_hex("abc"), "abc");
    }
}
