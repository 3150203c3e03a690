//! BLAKE3 content digests and their wire encoding.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Size of a content digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Buffer size for streaming digest computation.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Errors that can occur while computing or decoding digests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DigestError {
    /// The input could not be read as bytes.
    #[error("cannot read content: {0}")]
    Encoding(#[from] std::io::Error),

    /// A hex string had the wrong length for a 32-byte digest.
    #[error("invalid digest length: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        /// The expected number of hex characters (without the `0x` tag).
        expected: usize,
        /// The actual number of hex characters.
        actual: usize,
    },

    /// A hex string contained a non-hex character.
    #[error("invalid hex character {character:?} at offset {offset}")]
    InvalidHex {
        /// The offending character.
        character: char,
        /// Byte offset within the hex string.
        offset: usize,
    },
}

/// A 32-byte BLAKE3 digest identifying document content.
///
/// Equality of digests defines content identity: two documents with
/// identical bytes hash to the same `ContentDigest` regardless of where the
/// hash was computed. The wire encoding is lowercase hex with a `0x` tag,
/// matching the ledger contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; DIGEST_SIZE]);

impl ContentDigest {
    /// The all-zero digest, used on the ledger wire as the "no parent"
    /// sentinel for version 1 of a chain.
    pub const ZERO: Self = Self([0u8; DIGEST_SIZE]);

    /// Computes the digest of a byte slice.
    ///
    /// Pure and deterministic; identical bytes always produce identical
    /// digests.
    #[must_use]
    pub fn of_bytes(content: &[u8]) -> Self {
        Self(*blake3::hash(content).as_bytes())
    }

    /// Computes the digest of a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Encoding`] if the reader fails.
    pub fn of_reader<R: Read>(mut reader: R) -> Result<Self, DigestError> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Constructs a digest from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Returns true if this is the all-zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Encodes the digest as `0x`-prefixed lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(2 + DIGEST_SIZE * 2);
        out.push_str("0x");
        out.push_str(&hex::encode(&self.0));
        out
    }

    /// Decodes a digest from lowercase or uppercase hex, with or without
    /// the `0x` tag.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidLength`] or [`DigestError::InvalidHex`]
    /// if the string is not a valid 32-byte hex encoding.
    pub fn parse_hex(s: &str) -> Result<Self, DigestError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        if stripped.len() != DIGEST_SIZE * 2 {
            return Err(DigestError::InvalidLength {
                expected: DIGEST_SIZE * 2,
                actual: stripped.len(),
            });
        }
        let mut bytes = [0u8; DIGEST_SIZE];
        for (i, chunk) in stripped.as_bytes().chunks(2).enumerate() {
            let high = hex::nibble(chunk[0]).ok_or(DigestError::InvalidHex {
                character: chunk[0] as char,
                offset: i * 2,
            })?;
            let low = hex::nibble(chunk[1]).ok_or(DigestError::InvalidHex {
                character: chunk[1] as char,
                offset: i * 2 + 1,
            })?;
            bytes[i] = (high << 4) | low;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = ContentDigest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 0x-prefixed 64-character hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                ContentDigest::parse_hex(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Utility module for hex encoding.
mod hex {
    use std::fmt::Write;

    /// Encodes bytes as a lowercase hex string (no tag).
    pub fn encode(bytes: &[u8]) -> String {
        bytes
            .iter()
            .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            })
    }

    /// Converts a hex character to its nibble value.
    pub const fn nibble(c: u8) -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let content = b"research proposal draft";
        let d1 = ContentDigest::of_bytes(content);
        let d2 = ContentDigest::of_bytes(content);
        assert_eq!(d1, d2);

        let d3 = ContentDigest::of_bytes(b"different content");
        assert_ne!(d1, d3);
    }

    #[test]
    fn test_reader_matches_bytes() {
        let content = b"streamed content".to_vec();
        let from_bytes = ContentDigest::of_bytes(&content);
        let from_reader = ContentDigest::of_reader(&content[..]).unwrap();
        assert_eq!(from_bytes, from_reader);
    }

    #[test]
    fn test_reader_failure_is_encoding_error() {
        struct FailingReader;

        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("stream gone"))
            }
        }

        let result = ContentDigest::of_reader(FailingReader);
        assert!(matches!(result, Err(DigestError::Encoding(_))));
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = ContentDigest::of_bytes(b"roundtrip");
        let encoded = digest.to_hex();
        assert!(encoded.starts_with("0x"));
        assert_eq!(encoded.len(), 2 + DIGEST_SIZE * 2);

        let decoded = ContentDigest::parse_hex(&encoded).unwrap();
        assert_eq!(digest, decoded);
    }

    #[test]
    fn test_parse_without_tag() {
        let digest = ContentDigest::of_bytes(b"untagged");
        let bare = digest.to_hex()[2..].to_string();
        assert_eq!(ContentDigest::parse_hex(&bare).unwrap(), digest);
    }

    #[test]
    fn test_parse_invalid_length() {
        let result = ContentDigest::parse_hex("0x0123");
        assert!(matches!(result, Err(DigestError::InvalidLength { .. })));
    }

    #[test]
    fn test_parse_invalid_character() {
        let bad = format!("0x{}", "zz".repeat(DIGEST_SIZE));
        let result = ContentDigest::parse_hex(&bad);
        assert!(matches!(
            result,
            Err(DigestError::InvalidHex { offset: 0, .. })
        ));
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(ContentDigest::ZERO.is_zero());
        assert!(!ContentDigest::of_bytes(b"x").is_zero());
        assert_eq!(
            ContentDigest::ZERO.to_hex(),
            format!("0x{}", "00".repeat(DIGEST_SIZE))
        );
    }

    #[test]
    fn test_serde_hex_form() {
        let digest = ContentDigest::of_bytes(b"serde");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));

        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
