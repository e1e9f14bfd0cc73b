// crates/divine-guard-core/src/core/hashing.rs
// ============================================================================
// Module: Divine Guard Canonical Hashing
// Description: Canonical JSON encoding and digests for snapshots and stored rules.
// Purpose: Give `config_hash`, rule records and token fingerprints one digest form.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Compiled scope objects are hashed over RFC 8785 (JCS) canonical JSON so the
//! same rule set and context always yield the same `config_hash`, regardless
//! of map ordering or the compilation instant. Stored rule records carry the
//! same digest form and are re-verified on every read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Digest algorithms a snapshot or stored rule may be labelled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

/// Algorithm used for `config_hash` and new rule records.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

impl HashAlgorithm {
    /// Returns the persisted label, matching the serde wire name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Parses a persisted label.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::UnknownAlgorithm`] for labels this build cannot verify.
    pub fn from_label(label: &str) -> Result<Self, HashError> {
        match label {
            "sha256" => Ok(Self::Sha256),
            other => Err(HashError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Algorithm-tagged digest, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Returns true when `bytes` hash to this digest under its algorithm.
    #[must_use]
    pub fn verifies(&self, bytes: &[u8]) -> bool {
        hash_bytes(self.algorithm, bytes).value == self.value
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing or checking digests.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// Persisted algorithm label is not supported.
    #[error("unsupported hash algorithm: {0}")]
    UnknownAlgorithm(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns RFC 8785 canonical JSON bytes for a serializable value.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes the canonical JSON form of `value`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    Ok(hash_bytes(algorithm, &canonical_json_bytes(value)?))
}

/// Hashes raw bytes.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    let digest = match algorithm {
        HashAlgorithm::Sha256 => Sha256::digest(bytes),
    };
    let mut value = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(value, "{byte:02x}");
    }
    HashDigest {
        algorithm,
        value,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_hash_ignores_key_order() {
        let left = json!({"media": {"disable_video": true, "force_image_quality": "low"}});
        let right = json!({"media": {"force_image_quality": "low", "disable_video": true}});
        assert_eq!(
            hash_canonical_json(DEFAULT_HASH_ALGORITHM, &left).unwrap(),
            hash_canonical_json(DEFAULT_HASH_ALGORITHM, &right).unwrap()
        );
    }

    #[test]
    fn sha256_digest_is_lowercase_hex() {
        let digest = hash_bytes(HashAlgorithm::Sha256, b"abc");
        assert_eq!(
            digest.value,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(digest.verifies(b"abc"));
        assert!(!digest.verifies(b"abd"));
    }

    #[test]
    fn labels_round_trip_and_unknown_labels_fail() {
        let label = DEFAULT_HASH_ALGORITHM.label();
        assert_eq!(HashAlgorithm::from_label(label).unwrap(), DEFAULT_HASH_ALGORITHM);
        assert_eq!(serde_json::to_value(DEFAULT_HASH_ALGORITHM).unwrap(), json!(label));
        assert!(matches!(
            HashAlgorithm::from_label("md5"),
            Err(HashError::UnknownAlgorithm(_))
        ));
    }
}
