//! Manifest digest validation
//!
//! Digests come back from the registry in the `Docker-Content-Digest` header
//! and are the only identity used for deletes, so a malformed value must
//! never reach a DELETE URL.

use crate::error::{RegistryError, Result};

/// Utilities for working with content digests in Docker context
pub struct DigestUtils;

impl DigestUtils {
    /// Expected hex length for the digest algorithms registries emit
    fn expected_hex_len(algorithm: &str) -> Option<usize> {
        match algorithm {
            "sha256" => Some(64),
            "sha384" => Some(96),
            "sha512" => Some(128),
            _ => None,
        }
    }

    /// Validate full Docker digest format (`<algorithm>:<hex>`)
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        let Some((algorithm, encoded)) = digest.split_once(':') else {
            return false;
        };

        match Self::expected_hex_len(algorithm) {
            Some(len) => encoded.len() == len && hex::decode(encoded).is_ok(),
            None => false,
        }
    }

    /// Validate a digest header value, trimming surrounding whitespace
    pub fn parse_header_digest(value: &str) -> Result<String> {
        let digest = value.trim();
        if Self::is_valid_docker_digest(digest) {
            Ok(digest.to_string())
        } else {
            Err(RegistryError::Parse(format!(
                "Invalid manifest digest: {:?}",
                digest
            )))
        }
    }
}
