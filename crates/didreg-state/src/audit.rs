// SPDX-License-Identifier: BUSL-1.1
//! # Audit Trail
//!
//! Every mutating registry call produces exactly one [`AuditEvent`]: a
//! success event emitted while the ledger's key guard is still held, or a
//! failure event (`outcome = failed`) after the call is rejected. Events go
//! to an [`AuditSink`]; the registry does not care what is behind it.
//!
//! Two sinks ship with the crate:
//!
//! - [`AuditTrail`]: in-memory, append-only, hash-chained. Each record's
//!   digest covers its index, its predecessor's digest, and the event, so
//!   any edit or reordering of retained records is detectable by
//!   [`AuditTrail::verify_chain()`].
//! - [`TracingAuditSink`]: forwards events to `tracing` under the
//!   `didreg::audit` target.
//!
//! [`AuditFanout`] delivers to several sinks in order.
//!
//! ## Capacity
//!
//! When the trail exceeds its capacity the oldest 10% of records are dropped.
//! The chain stays verifiable from the first retained record onwards.

use std::sync::Arc;

use didreg_core::{sha256_digest, CanonicalBytes, ContentDigest, Principal, RegistryError, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// Every mutating operation the registry exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateIdentity,
    UpdateDocument,
    SetKycStatus,
    IssueCredential,
    RevokeCredential,
    RestoreCredential,
    CreateStatusList,
    PublishStatusList,
    TransferListController,
    GrantRole,
    RevokeRole,
    RenounceRole,
    Pause,
    Unpause,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateIdentity => "create_identity",
            Self::UpdateDocument => "update_document",
            Self::SetKycStatus => "set_kyc_status",
            Self::IssueCredential => "issue_credential",
            Self::RevokeCredential => "revoke_credential",
            Self::RestoreCredential => "restore_credential",
            Self::CreateStatusList => "create_status_list",
            Self::PublishStatusList => "publish_status_list",
            Self::TransferListController => "transfer_list_controller",
            Self::GrantRole => "grant_role",
            Self::RevokeRole => "revoke_role",
            Self::RenounceRole => "renounce_role",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }

    /// Whether a successful call counts toward `total_operations`.
    ///
    /// Only identity and credential operations do. Status list, role, and
    /// pause operations are audited but not counted.
    pub fn counts_as_operation(&self) -> bool {
        matches!(
            self,
            Self::CreateIdentity
                | Self::UpdateDocument
                | Self::SetKycStatus
                | Self::IssueCredential
                | Self::RevokeCredential
                | Self::RestoreCredential
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

/// How a call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { code: String, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// The error code of a failed call.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Failed { code, .. } => Some(code),
        }
    }
}

/// A structured record of one mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub kind: OperationKind,
    /// The key the call targeted: identity key, credential id, list id, or
    /// the principal whose role changed. Empty for pause/unpause.
    pub subject: String,
    pub actor: Principal,
    pub timestamp: Timestamp,
    pub outcome: Outcome,
    /// Commit sequence number; present on success only.
    pub sequence: Option<u64>,
    pub details: Option<Value>,
}

impl AuditEvent {
    pub fn succeeded(
        kind: OperationKind,
        subject: impl Into<String>,
        actor: &Principal,
        sequence: u64,
        details: Option<Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            subject: subject.into(),
            actor: actor.clone(),
            timestamp: Timestamp::now(),
            outcome: Outcome::Succeeded,
            sequence: Some(sequence),
            details,
        }
    }

    pub fn failed(
        kind: OperationKind,
        subject: impl Into<String>,
        actor: &Principal,
        error: &RegistryError,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            subject: subject.into(),
            actor: actor.clone(),
            timestamp: Timestamp::now(),
            outcome: Outcome::Failed {
                code: error.code().to_string(),
                message: error.to_string(),
            },
            sequence: None,
            details: None,
        }
    }
}

/// Destination for audit events.
///
/// `emit` is called with ledger guards held on the success path, so
/// implementations must not call back into the registry.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// A retained audit event with its chain link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the trail since creation; survives trimming.
    pub index: u64,
    pub prev_digest: Option<ContentDigest>,
    /// `None` only if the event could not be canonicalized.
    pub digest: Option<ContentDigest>,
    pub event: AuditEvent,
}

#[derive(Serialize)]
struct ChainLink<'a> {
    index: u64,
    prev_digest: &'a Option<ContentDigest>,
    event: &'a AuditEvent,
}

fn link_digest(index: u64, prev_digest: &Option<ContentDigest>, event: &AuditEvent) -> Option<ContentDigest> {
    let link = ChainLink {
        index,
        prev_digest,
        event,
    };
    match CanonicalBytes::new(&link) {
        Ok(canonical) => Some(sha256_digest(&canonical)),
        Err(e) => {
            tracing::warn!(index, kind = %event.kind, error = %e, "audit event canonicalization failed; digest unavailable");
            None
        }
    }
}

/// A break found by [`AuditTrail::verify_chain()`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("audit record {index}: digest missing")]
    MissingDigest { index: u64 },
    #[error("audit record {index}: digest does not match contents")]
    DigestMismatch { index: u64 },
    #[error("audit record {index}: does not link to record {previous}")]
    BrokenLink { index: u64, previous: u64 },
}

#[derive(Debug)]
struct TrailState {
    records: Vec<AuditRecord>,
    next_index: u64,
    last_digest: Option<ContentDigest>,
}

/// In-memory, hash-chained audit trail.
pub struct AuditTrail {
    state: Mutex<TrailState>,
    max_entries: usize,
}

impl AuditTrail {
    /// Create a trail retaining at most `max_entries` records (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(TrailState {
                records: Vec::new(),
                next_index: 0,
                last_digest: None,
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Append an event, chaining it to the previous record.
    pub fn append(&self, event: AuditEvent) -> AuditRecord {
        let mut state = self.state.lock();
        let index = state.next_index;
        let prev_digest = state.last_digest;
        let digest = link_digest(index, &prev_digest, &event);
        let record = AuditRecord {
            index,
            prev_digest,
            digest,
            event,
        };
        state.records.push(record.clone());
        state.next_index += 1;
        state.last_digest = digest;

        if state.records.len() > self.max_entries {
            let trim_count = (self.max_entries / 10).max(1);
            state.records.drain(..trim_count);
        }
        record
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.state.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Number of events ever appended, including trimmed ones.
    pub fn total_appended(&self) -> u64 {
        self.state.lock().next_index
    }

    pub fn entries_for_subject(&self, subject: &str) -> Vec<AuditRecord> {
        self.filtered(|r| r.event.subject == subject)
    }

    pub fn entries_by_kind(&self, kind: OperationKind) -> Vec<AuditRecord> {
        self.filtered(|r| r.event.kind == kind)
    }

    pub fn failures(&self) -> Vec<AuditRecord> {
        self.filtered(|r| !r.event.outcome.is_success())
    }

    /// The last `n` records (or all of them if fewer exist).
    pub fn last_n(&self, n: usize) -> Vec<AuditRecord> {
        let state = self.state.lock();
        let start = state.records.len().saturating_sub(n);
        state.records[start..].to_vec()
    }

    fn filtered(&self, pred: impl Fn(&AuditRecord) -> bool) -> Vec<AuditRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }

    /// Recompute every retained digest and check each link.
    ///
    /// Returns the number of records verified.
    pub fn verify_chain(&self) -> Result<usize, ChainError> {
        let state = self.state.lock();
        verify_records(&state.records)
    }
}

/// Verify a sequence of records exported from a trail.
pub fn verify_records(records: &[AuditRecord]) -> Result<usize, ChainError> {
    let mut previous: Option<&AuditRecord> = None;
    for record in records {
        let stored = record
            .digest
            .ok_or(ChainError::MissingDigest { index: record.index })?;
        if link_digest(record.index, &record.prev_digest, &record.event) != Some(stored) {
            return Err(ChainError::DigestMismatch { index: record.index });
        }
        if let Some(prev) = previous {
            if record.index != prev.index + 1 || record.prev_digest != prev.digest {
                return Err(ChainError::BrokenLink {
                    index: record.index,
                    previous: prev.index,
                });
            }
        }
        previous = Some(record);
    }
    Ok(records.len())
}

impl AuditSink for AuditTrail {
    fn emit(&self, event: &AuditEvent) {
        self.append(event.clone());
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Other sinks
// ---------------------------------------------------------------------------

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        match &event.outcome {
            Outcome::Succeeded => tracing::info!(
                target: "didreg::audit",
                event_id = %event.event_id,
                kind = %event.kind,
                subject = %event.subject,
                actor = %event.actor,
                sequence = event.sequence,
                "operation succeeded"
            ),
            Outcome::Failed { code, message } => tracing::warn!(
                target: "didreg::audit",
                event_id = %event.event_id,
                kind = %event.kind,
                subject = %event.subject,
                actor = %event.actor,
                code = %code,
                "operation failed: {message}"
            ),
        }
    }
}

/// Delivers each event to every inner sink, in order.
#[derive(Default, Clone)]
pub struct AuditFanout {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditSink for AuditFanout {
    fn emit(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

impl std::fmt::Debug for AuditFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditFanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
