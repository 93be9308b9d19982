//! SHA-256 key fingerprints.
//!
//! License keys are bearer tokens, so tracing output refers to them only by
//! a truncated fingerprint.

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest in a fingerprint.
const FINGERPRINT_LEN: usize = 12;

/// Full hex-encoded SHA-256 of a license key.
pub fn hash_license_key(license_key: &str) -> String {
    let hash = Sha256::digest(license_key.as_bytes());
    hex::encode(hash)
}

/// Short fingerprint of a license key, safe to log.
pub fn key_fingerprint(license_key: &str) -> String {
    let mut hash = hash_license_key(license_key);
    hash.truncate(FINGERPRINT_LEN);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_empty_key() {
        assert_eq!(
            hash_license_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_is_prefix_of_hash() {
        let key = "KEY-ABCD1234EFGH5678IJKL9012MNOP3456";
        let fp = key_fingerprint(key);
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(hash_license_key(key).starts_with(&fp));
        assert!(!fp.contains("KEY"));
    }

    #[test]
    fn test_fingerprint_distinguishes_keys() {
        assert_ne!(key_fingerprint("KEY-A"), key_fingerprint("KEY-B"));
    }
}
