//! Hash-prefix set utilities shared by `GetHash`/`SetHash`/`FindHash`/`RespHashSet`.
//!
//! A hash prefix is the first two bytes of a file's digest, used as a
//! compact file identifier in peer exchange. Adopts the stricter of
//! zerolib's two historical length rules: at most 2000 bytes (1000
//! prefixes), rejecting the looser 4000-hash-id variant some peers send.

use std::collections::BTreeSet;

use crate::error::PacketError;

pub type HashPrefix = [u8; 2];

const MAX_HASHFIELD_BYTES: usize = 2000;

/// Encodes an integer `0..=0xFFFF` as a big-endian 2-byte hash prefix.
pub fn hash_prefix(id: u32) -> Result<HashPrefix, PacketError> {
    if id > 0xFFFF {
        return Err(PacketError::value(format!(
            "hash id out of range (0, 0xFFFF): {}",
            id
        )));
    }
    Ok((id as u16).to_be_bytes())
}

/// Parses a raw `hashfield_raw` byte string into the set of its consecutive
/// 2-byte prefixes. Length must be even and at most 2000 bytes.
pub fn hash_set(bytes: &[u8]) -> Result<BTreeSet<HashPrefix>, PacketError> {
    if bytes.len() > MAX_HASHFIELD_BYTES {
        return Err(PacketError::value(format!(
            "too many hash ids to unpack: {} bytes > {}",
            bytes.len(),
            MAX_HASHFIELD_BYTES
        )));
    }
    if bytes.len() % 2 != 0 {
        return Err(PacketError::value(format!(
            "hash id string length should be a multiple of 2, not {}",
            bytes.len()
        )));
    }
    let mut prefixes = BTreeSet::new();
    for chunk in bytes.chunks_exact(2) {
        prefixes.insert([chunk[0], chunk[1]]);
    }
    Ok(prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_set_round_trip() {
        let bytes = b"\x10\x11ABCDef12";
        let result = hash_set(bytes).unwrap();
        let expected: BTreeSet<HashPrefix> = [*b"\x10\x11", *b"AB", *b"CD", *b"ef", *b"12"]
            .into_iter()
            .collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn hash_set_empty_is_empty() {
        assert!(hash_set(b"").unwrap().is_empty());
    }

    #[test]
    fn hash_set_rejects_odd_length() {
        assert!(hash_set(b"abc").is_err());
    }

    #[test]
    fn hash_set_rejects_over_cap() {
        let bytes = vec![0u8; 2002];
        assert!(hash_set(&bytes).is_err());
    }

    #[test]
    fn hash_prefix_round_trip() {
        assert_eq!(hash_prefix(0x4142).unwrap(), *b"AB");
        assert!(hash_prefix(0x1_0000).is_err());
    }
}
