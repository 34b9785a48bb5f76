// Cryptographic hashing wrappers
use sha2::{Digest, Sha256};

/// SHA-256: used for transaction and block identity hashing.
pub fn hash_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 concat: hashes a then b without allocating a temporary Vec.
pub fn hash_sha256_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Lowercase hex of a hash, for PoW target comparison and address strings.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_length() {
        let hash = hash_sha256(b"rillchain");
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn test_sha256_concat_matches_sequential_update() {
        let a = b"hello";
        let b = b"world";
        let mut joined = Vec::new();
        joined.extend_from_slice(a);
        joined.extend_from_slice(b);
        assert_eq!(hash_sha256_concat(a, b), hash_sha256(&joined));
    }

    #[test]
    fn test_to_hex_is_lowercase() {
        let hash = hash_sha256(b"miner123");
        let hex_str = to_hex(&hash);
        assert_eq!(hex_str, hex_str.to_lowercase());
        assert_eq!(hex_str.len(), 64);
    }
}
