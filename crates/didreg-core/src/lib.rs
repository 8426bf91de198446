// SPDX-License-Identifier: BUSL-1.1
//! # didreg-core: Foundational Types for the DID Registry
//!
//! Every other crate in the workspace depends on `didreg-core`; it depends on
//! nothing internal.
//!
//! ## Contents
//!
//! - Validated identifier newtypes: [`Principal`], [`CredentialId`], [`ListId`].
//!   No bare strings cross the registry API.
//! - [`Hash32`], the opaque 32-byte digest carried by credentials and
//!   status lists, compared byte-for-byte and never interpreted.
//! - [`CanonicalBytes`] and [`sha256_digest()`]: the only path for computing
//!   registry-side digests (status list keys, audit chain links).
//! - [`Timestamp`], UTC with seconds precision.
//! - [`Role`], the five registry capabilities.
//! - [`RegistryError`], the closed error taxonomy every operation reports.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod role;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest, Hash32};
pub use error::{CanonicalizationError, RecordKind, RegistryError, ValidationError};
pub use identity::{CredentialId, ListId, Principal};
pub use role::Role;
pub use temporal::Timestamp;
