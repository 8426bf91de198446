// SPDX-License-Identifier: BUSL-1.1
//! Shared state every ledger commits through: the access gate, the metrics
//! counters, the audit sink, and the commit sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use didreg_core::{Principal, RegistryError};
use serde_json::Value;

use crate::access::AccessGate;
use crate::audit::{AuditEvent, AuditSink, OperationKind};
use crate::metrics::{MetricsAggregator, SystemMetrics};

pub struct LedgerContext {
    pub gate: AccessGate,
    pub metrics: MetricsAggregator,
    audit: Arc<dyn AuditSink>,
    sequence: AtomicU64,
}

impl LedgerContext {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            gate: AccessGate::new(),
            metrics: MetricsAggregator::new(),
            audit,
            sequence: AtomicU64::new(0),
        }
    }

    /// Last commit sequence number handed out.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Allocate the sequence number for a commit. Starts at 1.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Run a mutating operation, auditing and logging it if it is rejected.
    ///
    /// The success event is the operation's own responsibility (see
    /// [`LedgerContext::commit`]) because it must be emitted under the key
    /// guard. Failures are emitted here, after every guard is released.
    pub(crate) fn audited<T>(
        &self,
        kind: OperationKind,
        subject: &str,
        actor: &Principal,
        op: impl FnOnce() -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        op().map_err(|err| {
            tracing::warn!(kind = %kind, subject, actor = %actor, code = err.code(), "rejected: {err}");
            self.audit.emit(&AuditEvent::failed(kind, subject, actor, &err));
            err
        })
    }

    /// Record a committed mutation: apply its counter changes (plus
    /// `total_operations` when the kind counts) in one metrics update, then
    /// emit the success event.
    pub(crate) fn commit(
        &self,
        kind: OperationKind,
        subject: &str,
        actor: &Principal,
        sequence: u64,
        details: Option<Value>,
        counters: impl FnOnce(&mut SystemMetrics),
    ) {
        self.metrics.apply(|m| {
            counters(m);
            if kind.counts_as_operation() {
                m.total_operations += 1;
            }
        });
        tracing::debug!(kind = %kind, subject, actor = %actor, sequence, "committed");
        self.audit
            .emit(&AuditEvent::succeeded(kind, subject, actor, sequence, details));
    }
}

impl std::fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContext")
            .field("paused", &self.gate.is_paused())
            .field("sequence", &self.current_sequence())
            .finish()
    }
}
