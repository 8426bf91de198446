// SPDX-License-Identifier: BUSL-1.1
//! # System Metrics
//!
//! Running counters maintained incrementally by the ledgers. Each ledger
//! updates the counters while it still holds the key guard of the record it
//! just changed, so once an operation returns, the counters agree with the
//! ledgers. [`crate::Registry::reconcile()`] checks that claim by full scan.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_identities: u64,
    pub total_verified_identities: u64,
    /// Credentials ever issued. Revocation does not decrement this.
    pub total_credentials: u64,
    /// Credentials currently revoked.
    pub total_revoked_credentials: u64,
    /// Successful identity and credential operations.
    pub total_operations: u64,
}

impl SystemMetrics {
    /// The tuple form `(identities, verified, credentials, revoked, operations)`.
    pub fn as_tuple(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.total_identities,
            self.total_verified_identities,
            self.total_credentials,
            self.total_revoked_credentials,
            self.total_operations,
        )
    }
}

/// Owner of the live counters.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    current: Mutex<SystemMetrics>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SystemMetrics {
        *self.current.lock()
    }

    /// Apply a counter update. Callers hold the guard of the ledger record
    /// they changed, which is always acquired before this mutex.
    pub(crate) fn apply(&self, update: impl FnOnce(&mut SystemMetrics)) {
        let mut current = self.current.lock();
        update(&mut current);
    }
}
