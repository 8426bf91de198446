// SPDX-License-Identifier: BUSL-1.1
//! # Error Types
//!
//! The registry reports every rejected call through [`RegistryError`]. Each
//! variant carries enough context to explain the rejection (which key, which
//! role, stored vs attempted version) and maps to a stable machine-readable
//! code via [`RegistryError::code()`]. Codes are what audit events and the CLI
//! record; display strings are for humans.
//!
//! All registry errors are local and synchronous. Nothing is retried
//! internally and a rejected call never leaves partial effects behind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which ledger a key belongs to, for `AlreadyExists` / `NotFound` context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Identity,
    Credential,
    StatusList,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Credential => "credential",
            Self::StatusList => "status_list",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The caller lacks the role (or ownership) the operation requires.
    #[error("{principal} is not authorized: {requirement}")]
    Unauthorized {
        principal: String,
        /// Human-readable requirement, e.g. `role 'issuer' required`.
        requirement: String,
    },

    /// A mutating call arrived while the registry is paused.
    #[error("registry is paused")]
    SystemPaused,

    /// `unpause` was called while the registry is running.
    #[error("registry is not paused")]
    NotPaused,

    /// Duplicate identity, credential, or status list key.
    #[error("{kind} {key:?} already exists")]
    AlreadyExists { kind: RecordKind, key: String },

    /// The referenced identity, credential, or status list is absent.
    #[error("{kind} {key:?} not found")]
    NotFound { kind: RecordKind, key: String },

    /// Credential issuance against an unknown identity.
    #[error("subject identity {0:?} not found")]
    SubjectNotFound(String),

    #[error("credential {0:?} is already revoked")]
    AlreadyRevoked(String),

    #[error("credential {0:?} is not revoked")]
    NotRevoked(String),

    /// Status list versions must strictly increase.
    #[error("status list {list_id:?}: version {attempted} must be greater than stored version {stored}")]
    InvalidVersion {
        list_id: String,
        stored: u64,
        attempted: u64,
    },

    /// Publish by a principal other than the list's controller.
    #[error("status list {list_id:?} is controlled by {controller}, not {caller}")]
    NotController {
        list_id: String,
        caller: String,
        controller: String,
    },

    /// Malformed input rejected before reaching a ledger.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Digest computation over registry data failed.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl RegistryError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::SystemPaused => "SYSTEM_PAUSED",
            Self::NotPaused => "NOT_PAUSED",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::SubjectNotFound(_) => "SUBJECT_NOT_FOUND",
            Self::AlreadyRevoked(_) => "ALREADY_REVOKED",
            Self::NotRevoked(_) => "NOT_REVOKED",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::NotController { .. } => "NOT_CONTROLLER",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Integrity(_) => "INTEGRITY_ERROR",
        }
    }

    pub fn not_found(kind: RecordKind, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn already_exists(kind: RecordKind, key: impl std::fmt::Display) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.to_string(),
        }
    }
}

impl From<CanonicalizationError> for RegistryError {
    fn from(e: CanonicalizationError) -> Self {
        Self::Integrity(e.to_string())
    }
}

/// Input rejected by an identifier or digest constructor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid principal {0:?}: must be non-empty without whitespace, at most 256 characters")]
    InvalidPrincipal(String),

    #[error("invalid {kind} identifier {value:?}: must be non-empty, at most 256 characters")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("invalid 32-byte hash {0:?}: expected 64 hex characters, optionally 0x-prefixed")]
    InvalidHash(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values have no deterministic canonical form.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
