// SPDX-License-Identifier: BUSL-1.1
//! # Digests
//!
//! Two distinct 32-byte types live here and must not be confused:
//!
//! - [`Hash32`] is an *opaque* caller-supplied digest: a credential's content
//!   hash, a status list's canonical hash or purpose tag. The registry never
//!   computes or interprets it, only stores it and compares it byte-for-byte.
//! - [`ContentDigest`] is a digest the registry *computes* itself, always
//!   SHA-256 over [`CanonicalBytes`]. Status list keys and audit chain links
//!   are `ContentDigest`s.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::ValidationError;

fn to_hex(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_hex32(s: &str) -> Option<[u8; 32]> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    if hex.len() != 64 || !hex.is_ascii() {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Hash32
// ---------------------------------------------------------------------------

/// An opaque 32-byte digest supplied by a caller.
///
/// Parsed from 64 hex characters with an optional `0x` prefix; displayed and
/// serialized as lowercase `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded digest.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        parse_hex32(s.trim())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidHash(s.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({self})")
    }
}

impl std::str::FromStr for Hash32 {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Hash32 {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Hash32> for String {
    fn from(h: Hash32) -> Self {
        h.to_string()
    }
}

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// A SHA-256 digest computed by the registry over canonical bytes.
///
/// Displayed and serialized as `sha256:<hex>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest {
    bytes: [u8; 32],
}

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.bytes)
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let parsed = s.strip_prefix("sha256:").and_then(parse_hex32);
        match parsed {
            Some(bytes) => Ok(Self { bytes }),
            None => Err(ValidationError::InvalidHash(s)),
        }
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.to_string()
    }
}

/// Compute a SHA-256 digest from canonical bytes.
///
/// Takes `&CanonicalBytes` rather than `&[u8]` so every registry-computed
/// digest goes through canonicalization first.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    let hash = Sha256::digest(data.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest { bytes }
}
