// SPDX-License-Identifier: BUSL-1.1
//! # didreg-state: Registry State Machines
//!
//! The transactional core of the DID registry:
//!
//! - [`access`]: role sets per principal and the global pause flag.
//! - [`identity`]: DID records, documents, KYC flags, credential indexes.
//! - [`credential`]: write-once issuance and the revoke/restore cycle.
//! - [`status_list`]: versioned status list pointers and controller transfer.
//! - [`metrics`]: counters kept in step with the ledgers.
//! - [`audit`]: audit events, sinks, and the hash-chained in-memory trail.
//! - [`registry`]: the facade that wires the above together.
//!
//! ## Concurrency
//!
//! Each ledger is a `DashMap`. A mutation validates and writes under the
//! entry guard of the key it touches, updates the counters, and emits its
//! audit event before releasing the guard. Calls on different keys run in
//! parallel; calls on the same key serialize. Lock order is role set or
//! identity entry, then credential entry, then metrics, then audit sink.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod access;
pub mod audit;
pub mod config;
pub mod context;
pub mod credential;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod status_list;

pub use access::AccessGate;
pub use audit::{
    verify_records, AuditEvent, AuditFanout, AuditRecord, AuditSink, AuditTrail, ChainError,
    OperationKind, Outcome, TracingAuditSink,
};
pub use config::{ConfigError, RegistryConfig, RoleGrant};
pub use context::LedgerContext;
pub use credential::{CredentialLedger, CredentialStatus, CredentialVerification, RevocationRecord};
pub use identity::{IdentityInfo, IdentityLedger, IdentityRecord};
pub use metrics::{MetricsAggregator, SystemMetrics};
pub use registry::{Reconciliation, Registry};
pub use status_list::{StatusListEvent, StatusListRecord, StatusListRegistry};
