// Fixed-width integer/byte encoding shared by the wire protocol and the
// transaction/block codecs.

use thiserror::Error;

pub const INT_LEN: usize = 4;
pub const ADDR_LEN: usize = 64;
pub const SIGN_LEN: usize = 64;
pub const HASH_LEN: usize = 32;
pub const MSGTYPE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("input too short: need at least {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    #[error("address string must be {expected} hex characters")]
    BadAddressString { expected: usize },
    #[error("invalid hex encoding")]
    BadHex,
}

/// Encodes a u32 as 4 big-endian bytes.
pub fn int_to_bytes(v: u32) -> [u8; INT_LEN] {
    v.to_be_bytes()
}

/// Decodes 4 big-endian bytes into a u32.
pub fn bytes_to_int(b: &[u8]) -> Result<u32, CodecError> {
    if b.len() < INT_LEN {
        return Err(CodecError::TooShort { need: INT_LEN, have: b.len() });
    }
    let mut arr = [0u8; INT_LEN];
    arr.copy_from_slice(&b[..INT_LEN]);
    Ok(u32::from_be_bytes(arr))
}

/// Hex-encodes a 64-byte address (lowercase).
pub fn addr_to_string(addr: &[u8; ADDR_LEN]) -> String {
    hex::encode(addr)
}

/// Parses a 128-character hex address string into 64 raw bytes.
pub fn addr_from_string(s: &str) -> Result<[u8; ADDR_LEN], CodecError> {
    if s.len() != ADDR_LEN * 2 {
        return Err(CodecError::BadAddressString { expected: ADDR_LEN * 2 });
    }
    let bytes = hex::decode(s).map_err(|_| CodecError::BadHex)?;
    let mut out = [0u8; ADDR_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_roundtrip() {
        let v = 305_419_896u32;
        let b = int_to_bytes(v);
        assert_eq!(bytes_to_int(&b).unwrap(), v);
    }

    #[test]
    fn test_int_is_big_endian() {
        assert_eq!(int_to_bytes(1), [0, 0, 0, 1]);
    }

    #[test]
    fn test_bytes_to_int_rejects_short_input() {
        assert_eq!(bytes_to_int(&[0, 0]), Err(CodecError::TooShort { need: 4, have: 2 }));
    }

    #[test]
    fn test_addr_string_roundtrip() {
        let addr = [0x42u8; ADDR_LEN];
        let s = addr_to_string(&addr);
        assert_eq!(s.len(), ADDR_LEN * 2);
        assert_eq!(addr_from_string(&s).unwrap(), addr);
    }

    #[test]
    fn test_addr_from_string_rejects_wrong_length() {
        assert!(addr_from_string("abcd").is_err());
    }
}
