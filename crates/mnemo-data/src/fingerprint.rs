//! Content-addressed fingerprinting for source artifacts

use sha2::{Digest, Sha256};

/// Generate the content fingerprint for raw source bytes
///
/// The hex-encoded SHA-256 digest identifies content across renames and
/// collapses duplicate submissions at the object layer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Generate a content hash for text
pub fn hash_content(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash_content("hello"), hash_content("hello"));
        assert_ne!(hash_content("hello"), hash_content("hello!"));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let digest = hash_bytes(b"");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
