//! Bitcoin-style double-SHA-256 and the 64-bit difficulty check.
//!
//! Every hash the miner produces goes through [`double_sha256_hex`]. The
//! acceptance rule compares only the leading 64 bits of the digest against
//! the difficulty threshold, not the full 256-bit target.

use sha2::{Digest, Sha256};

/// `SHA256(SHA256(data))` as raw bytes.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first: [u8; 32] = Sha256::digest(data).into();
    Sha256::digest(first).into()
}

/// `SHA256(SHA256(text))` over the UTF-8 bytes of `text`, as 64 lowercase hex chars.
pub fn double_sha256_hex(text: &str) -> String {
    hex_encode(&double_sha256(text.as_bytes()))
}

/// Leading 64 bits of a hex digest, read big-endian from its first 16 chars.
///
/// Returns `None` if the string is shorter than 16 chars or not hex.
pub fn hash_prefix_u64(hash: &str) -> Option<u64> {
    let prefix = hash.get(..16)?;
    if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(prefix, 16).ok()
}

/// A hash meets `difficulty` iff its 64-bit prefix is strictly below it.
/// Malformed hashes never meet any difficulty.
pub fn meets_difficulty(hash: &str, difficulty: u64) -> bool {
    hash_prefix_u64(hash).is_some_and(|prefix| prefix < difficulty)
}

/// Hex-encode bytes without any separator.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_DOUBLE_SHA: &str =
        "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456";

    // -----------------------------------------------------------------------
    // Hash primitive
    // -----------------------------------------------------------------------

    #[test]
    fn test_double_sha256_empty_string() {
        assert_eq!(double_sha256_hex(""), EMPTY_DOUBLE_SHA);
    }

    #[test]
    fn test_double_sha256_hex_is_lowercase_64_chars() {
        let h = double_sha256_hex("neuropow");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_double_sha256_differs_from_single() {
        let single = hex_encode(&Sha256::digest(b"abc"));
        assert_ne!(single, double_sha256_hex("abc"));
    }

    // -----------------------------------------------------------------------
    // Difficulty check
    // -----------------------------------------------------------------------

    #[test]
    fn test_meets_difficulty_zero_prefix() {
        let hash = "00000000000000001fffffffffffffffffffffffffffffffffffffffffffffff";
        assert!(meets_difficulty(hash, 0x0000_0000_0000_0002));
        assert!(!meets_difficulty(hash, 0));
    }

    #[test]
    fn test_meets_difficulty_is_strict() {
        let hash = "00000000000000ff0000000000000000";
        assert!(!meets_difficulty(hash, 0xff));
        assert!(meets_difficulty(hash, 0x100));
    }

    #[test]
    fn test_meets_difficulty_malformed() {
        assert!(!meets_difficulty("", u64::MAX));
        assert!(!meets_difficulty("0123", u64::MAX));
        assert!(!meets_difficulty("zz00000000000000", u64::MAX));
        assert!(!meets_difficulty("+000000000000000", u64::MAX));
    }

    #[test]
    fn test_hash_prefix_reads_big_endian() {
        assert_eq!(
            hash_prefix_u64("0102030405060708ffff"),
            Some(0x0102_0304_0506_0708)
        );
    }

    #[test]
    fn test_hex_encode_basic() {
        assert_eq!(hex_encode(&[0xab, 0xcd, 0x01]), "abcd01");
        assert_eq!(hex_encode(&[]), "");
    }
}
