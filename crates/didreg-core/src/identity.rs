// SPDX-License-Identifier: BUSL-1.1
//! # Identifier Newtypes
//!
//! Each registry namespace has its own type, so a credential identifier can
//! never be passed where a status list identifier is expected.
//!
//! ## Validation
//!
//! - [`Principal`]: an actor or identity key (address, DID, or any opaque
//!   account string). Trimmed and lowercased so `0xABC` and `0xabc` name the
//!   same principal. Must be non-empty and contain no whitespace.
//! - [`CredentialId`], [`ListId`]: caller-chosen identifiers. Trimmed, case
//!   preserved, non-empty.
//!
//! Deserialization routes through the same constructors.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::{sha256_digest, ContentDigest};
use crate::error::{CanonicalizationError, ValidationError};

const MAX_IDENTIFIER_LEN: usize = 256;

macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

macro_rules! impl_string_accessors {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

/// A principal: the caller of an operation, an identity key, a role holder,
/// or a status list controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Principal(String);

impl Principal {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty()
            || normalized.len() > MAX_IDENTIFIER_LEN
            || normalized.chars().any(char::is_whitespace)
        {
            return Err(ValidationError::InvalidPrincipal(raw));
        }
        Ok(Self(normalized))
    }
}

impl_string_accessors!(Principal);
impl_validating_deserialize!(Principal);

fn validate_identifier(kind: &'static str, raw: String) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::InvalidIdentifier { kind, value: raw });
    }
    Ok(trimmed.to_string())
}

/// Caller-supplied credential identifier, globally unique once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        validate_identifier("credential", value.into()).map(Self)
    }
}

impl_string_accessors!(CredentialId);
impl_validating_deserialize!(CredentialId);

/// Human-chosen status list identifier, unique per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListId(String);

impl ListId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        validate_identifier("status list", value.into()).map(Self)
    }

    /// Derived index key: SHA-256 over the canonical JSON form of the id.
    ///
    /// Published with status list events so subscribers can index lists by
    /// a fixed-width key instead of the free-form name.
    pub fn key(&self) -> Result<ContentDigest, CanonicalizationError> {
        let canonical = CanonicalBytes::new(&self.0)?;
        Ok(sha256_digest(&canonical))
    }
}

impl_string_accessors!(ListId);
impl_validating_deserialize!(ListId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_is_normalized() {
        let p = Principal::new("  0xABCdef  ").unwrap();
        assert_eq!(p.as_str(), "0xabcdef");
        assert_eq!(p, Principal::new("0xabcdef").unwrap());
    }

    #[test]
    fn principal_rejects_empty_and_whitespace() {
        assert!(Principal::new("").is_err());
        assert!(Principal::new("   ").is_err());
        assert!(Principal::new("alice bob").is_err());
        assert!(Principal::new("a".repeat(257)).is_err());
    }

    #[test]
    fn did_strings_are_valid_principals() {
        let p = Principal::new("did:example:Alice").unwrap();
        assert_eq!(p.to_string(), "did:example:alice");
    }

    #[test]
    fn credential_id_preserves_case() {
        let id = CredentialId::new(" Degree-2024-001 ").unwrap();
        assert_eq!(id.as_str(), "Degree-2024-001");
        assert!(CredentialId::new("").is_err());
    }

    #[test]
    fn list_key_is_deterministic_and_distinct() {
        let a = ListId::new("L1").unwrap();
        let b = ListId::new("L2").unwrap();
        assert_eq!(a.key().unwrap(), ListId::new("L1").unwrap().key().unwrap());
        assert_ne!(a.key().unwrap(), b.key().unwrap());
    }

    #[test]
    fn deserialize_validates() {
        let p: Principal = serde_json::from_str("\"Issuer1\"").unwrap();
        assert_eq!(p.as_str(), "issuer1");
        assert!(serde_json::from_str::<Principal>("\"\"").is_err());
        assert!(serde_json::from_str::<ListId>("\"  \"").is_err());
    }

    #[test]
    fn from_str_parses() {
        let id: CredentialId = "C1".parse().unwrap();
        assert_eq!(id.to_string(), "C1");
    }
}
