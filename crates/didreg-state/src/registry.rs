// SPDX-License-Identifier: BUSL-1.1
//! # Registry
//!
//! The procedure-call surface of the DID registry. `Registry` wires the
//! ledgers to one shared [`LedgerContext`] and adds the administrative
//! plane: role grants, pause control, metrics, audit access, and
//! reconciliation.
//!
//! Every mutating method takes the calling principal first. Read methods
//! take no caller unless they are privileged.
//!
//! ## Administrative operations
//!
//! Role changes and pause/unpause are audited like everything else but do
//! not count toward `total_operations`. Role changes are allowed while
//! paused, so an admin can still manage access during an incident.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use didreg_core::{CredentialId, Hash32, ListId, Principal, RegistryError, Role};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditFanout, AuditRecord, AuditSink, AuditTrail, OperationKind, TracingAuditSink};
use crate::config::{ConfigError, RegistryConfig};
use crate::context::LedgerContext;
use crate::credential::{CredentialLedger, CredentialVerification, RevocationRecord};
use crate::identity::{IdentityInfo, IdentityLedger, IdentityRecord};
use crate::metrics::SystemMetrics;
use crate::status_list::{StatusListRecord, StatusListRegistry};

/// Outcome of a full-scan comparison between the counters and the ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Counters as maintained incrementally.
    pub recorded: SystemMetrics,
    /// Counters recomputed from ledger contents. `total_operations` cannot be
    /// derived from state and is copied from `recorded`.
    pub recomputed: SystemMetrics,
    pub discrepancies: Vec<String>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

pub struct Registry {
    ctx: Arc<LedgerContext>,
    identities: Arc<IdentityLedger>,
    credentials: CredentialLedger,
    status_lists: StatusListRegistry,
    trail: Option<Arc<AuditTrail>>,
}

impl Registry {
    /// A registry with an in-memory audit trail and `admin` as the sole admin.
    pub fn new(admin: Principal) -> Self {
        let trail = Arc::new(AuditTrail::default());
        Self::build(&admin, trail.clone(), Some(trail))
    }

    /// A registry that sends audit events only to `sink`.
    pub fn with_sink(admin: Principal, sink: Arc<dyn AuditSink>) -> Self {
        Self::build(&admin, sink, None)
    }

    /// Build from configuration: bootstrap admin, initial grants, audit
    /// trail capacity, optional tracing mirror, and initial pause state.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let admin = config.admin_principal()?;
        let grants = config.grant_principals()?;

        let trail = Arc::new(AuditTrail::new(config.audit_capacity));
        let mut fanout = AuditFanout::new().with(trail.clone());
        if config.audit_to_tracing {
            fanout = fanout.with(Arc::new(TracingAuditSink));
        }
        let registry = Self::build(&admin, Arc::new(fanout), Some(trail));

        for (role, principal) in grants {
            registry.bootstrap_grant(&admin, role, &principal);
        }
        if config.start_paused {
            if let Err(e) = registry.pause(&admin) {
                tracing::warn!(error = %e, "could not start paused");
            }
        }
        Ok(registry)
    }

    fn build(admin: &Principal, sink: Arc<dyn AuditSink>, trail: Option<Arc<AuditTrail>>) -> Self {
        let ctx = Arc::new(LedgerContext::new(sink));
        let identities = Arc::new(IdentityLedger::new(ctx.clone()));
        let registry = Self {
            credentials: CredentialLedger::new(ctx.clone(), identities.clone()),
            status_lists: StatusListRegistry::new(ctx.clone()),
            identities,
            ctx,
            trail,
        };
        registry.bootstrap_grant(admin, Role::Admin, admin);
        tracing::info!(admin = %admin, "registry bootstrapped");
        registry
    }

    fn bootstrap_grant(&self, admin: &Principal, role: Role, principal: &Principal) {
        self.ctx.gate.update_roles(principal, |set| {
            let changed = set.insert(role);
            let sequence = self.ctx.next_sequence();
            self.ctx.commit(
                OperationKind::GrantRole,
                principal.as_str(),
                admin,
                sequence,
                Some(serde_json::json!({ "role": role, "changed": changed, "bootstrap": true })),
                |_| {},
            );
        });
    }

    // ─── Identity ────────────────────────────────────────────────────────

    pub fn create_identity(
        &self,
        caller: &Principal,
        key: &Principal,
        document: impl Into<String>,
    ) -> Result<IdentityInfo, RegistryError> {
        self.identities.create_identity(caller, key, document.into())
    }

    pub fn update_document(
        &self,
        caller: &Principal,
        key: &Principal,
        document: impl Into<String>,
    ) -> Result<IdentityInfo, RegistryError> {
        self.identities.update_document(caller, key, document.into())
    }

    pub fn set_kyc_status(
        &self,
        caller: &Principal,
        key: &Principal,
        verified: bool,
    ) -> Result<IdentityInfo, RegistryError> {
        self.identities.set_kyc_status(caller, key, verified)
    }

    pub fn get_identity_info(&self, key: &Principal) -> Result<IdentityInfo, RegistryError> {
        self.identities.get_identity_info(key)
    }

    pub fn exists(&self, key: &Principal) -> bool {
        self.identities.exists(key)
    }

    // ─── Credentials ─────────────────────────────────────────────────────

    pub fn issue_credential(
        &self,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        content_hash: Hash32,
    ) -> Result<RevocationRecord, RegistryError> {
        self.credentials.issue(caller, id, subject, content_hash)
    }

    pub fn revoke_credential(
        &self,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        reason: impl Into<String>,
    ) -> Result<RevocationRecord, RegistryError> {
        self.credentials.revoke(caller, id, subject, reason.into())
    }

    pub fn restore_credential(
        &self,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        reason: impl Into<String>,
    ) -> Result<RevocationRecord, RegistryError> {
        self.credentials.restore(caller, id, subject, reason.into())
    }

    pub fn is_credential_revoked(&self, id: &CredentialId) -> Result<bool, RegistryError> {
        self.credentials.is_revoked(id)
    }

    pub fn get_credential_revocation(
        &self,
        id: &CredentialId,
    ) -> Result<RevocationRecord, RegistryError> {
        self.credentials.revocation(id)
    }

    /// Credentials issued to `subject`, oldest first. Empty if the subject
    /// has none or does not exist.
    pub fn get_identity_credentials(&self, subject: &Principal) -> Vec<CredentialId> {
        self.identities.credentials_of(subject)
    }

    pub fn verify_credential(&self, id: &CredentialId, presented_hash: &Hash32) -> CredentialVerification {
        self.credentials.verify(id, presented_hash)
    }

    // ─── Status lists ────────────────────────────────────────────────────

    pub fn create_list(
        &self,
        caller: &Principal,
        list_id: &ListId,
        uri: impl Into<String>,
        hash: Hash32,
        size: u64,
        purpose: Hash32,
    ) -> Result<StatusListRecord, RegistryError> {
        self.status_lists
            .create(caller, list_id, uri.into(), hash, size, purpose)
    }

    pub fn publish(
        &self,
        caller: &Principal,
        list_id: &ListId,
        version: u64,
        uri: impl Into<String>,
        hash: Hash32,
    ) -> Result<StatusListRecord, RegistryError> {
        self.status_lists
            .publish(caller, list_id, version, uri.into(), hash)
    }

    pub fn transfer_list_controller(
        &self,
        caller: &Principal,
        list_id: &ListId,
        new_controller: &Principal,
    ) -> Result<StatusListRecord, RegistryError> {
        self.status_lists
            .transfer_controller(caller, list_id, new_controller)
    }

    pub fn get_list(&self, list_id: &ListId) -> Result<StatusListRecord, RegistryError> {
        self.status_lists.get(list_id)
    }

    pub fn list_ids(&self) -> Vec<ListId> {
        self.status_lists.list_ids()
    }

    // ─── Administration ──────────────────────────────────────────────────

    /// Grant `role` to `account`. Admin only. Returns `false` if the role
    /// was already held (still a successful, audited call).
    pub fn grant_role(
        &self,
        caller: &Principal,
        role: Role,
        account: &Principal,
    ) -> Result<bool, RegistryError> {
        self.ctx
            .audited(OperationKind::GrantRole, account.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Admin)?;
                Ok(self.change_role(OperationKind::GrantRole, caller, role, account))
            })
    }

    /// Take `role` away from `account`. Admin only.
    pub fn revoke_role(
        &self,
        caller: &Principal,
        role: Role,
        account: &Principal,
    ) -> Result<bool, RegistryError> {
        self.ctx
            .audited(OperationKind::RevokeRole, account.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Admin)?;
                Ok(self.change_role(OperationKind::RevokeRole, caller, role, account))
            })
    }

    /// Drop one of the caller's own roles. No admin role needed.
    pub fn renounce_role(&self, caller: &Principal, role: Role) -> Result<bool, RegistryError> {
        self.ctx
            .audited(OperationKind::RenounceRole, caller.as_str(), caller, || {
                Ok(self.change_role(OperationKind::RenounceRole, caller, role, caller))
            })
    }

    fn change_role(&self, kind: OperationKind, caller: &Principal, role: Role, account: &Principal) -> bool {
        self.ctx.gate.update_roles(account, |set| {
            let changed = match kind {
                OperationKind::GrantRole => set.insert(role),
                _ => set.remove(&role),
            };
            if changed {
                tracing::info!(kind = %kind, role = %role, account = %account, by = %caller, "role membership changed");
            }
            let sequence = self.ctx.next_sequence();
            self.ctx.commit(
                kind,
                account.as_str(),
                caller,
                sequence,
                Some(serde_json::json!({ "role": role, "changed": changed })),
                |_| {},
            );
            changed
        })
    }

    pub fn has_role(&self, role: Role, account: &Principal) -> bool {
        self.ctx.gate.has_role(account, role)
    }

    pub fn roles_of(&self, account: &Principal) -> BTreeSet<Role> {
        self.ctx.gate.roles_of(account)
    }

    pub fn role_members(&self, role: Role) -> Vec<Principal> {
        self.ctx.gate.members(role)
    }

    /// Stop all mutations. Admin or emergency role.
    pub fn pause(&self, caller: &Principal) -> Result<(), RegistryError> {
        self.set_paused(OperationKind::Pause, caller, true)
    }

    /// Resume mutations. Admin or emergency role.
    pub fn unpause(&self, caller: &Principal) -> Result<(), RegistryError> {
        self.set_paused(OperationKind::Unpause, caller, false)
    }

    fn set_paused(&self, kind: OperationKind, caller: &Principal, paused: bool) -> Result<(), RegistryError> {
        self.ctx.audited(kind, "", caller, || {
            self.ctx
                .gate
                .authorize_any(caller, &[Role::Admin, Role::Emergency])?;
            self.ctx.gate.transition_pause(paused)?;
            tracing::info!(paused, by = %caller, "pause state changed");
            let sequence = self.ctx.next_sequence();
            self.ctx.commit(kind, "", caller, sequence, None, |_| {});
            Ok(())
        })
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.gate.is_paused()
    }

    // ─── Observability ───────────────────────────────────────────────────

    pub fn get_system_metrics(&self) -> SystemMetrics {
        self.ctx.metrics.snapshot()
    }

    /// Retained audit records. Auditor or admin role.
    ///
    /// Empty when the registry was built with an external sink only.
    pub fn audit_events(&self, caller: &Principal) -> Result<Vec<AuditRecord>, RegistryError> {
        self.ctx
            .gate
            .authorize_any(caller, &[Role::Auditor, Role::Admin])?;
        Ok(self.trail.as_ref().map(|t| t.records()).unwrap_or_default())
    }

    /// Verify the retained audit chain. Auditor or admin role.
    pub fn verify_audit_chain(&self, caller: &Principal) -> Result<usize, RegistryError> {
        self.ctx
            .gate
            .authorize_any(caller, &[Role::Auditor, Role::Admin])?;
        match &self.trail {
            Some(trail) => trail
                .verify_chain()
                .map_err(|e| RegistryError::Integrity(e.to_string())),
            None => Ok(0),
        }
    }

    /// The in-memory trail, if this registry keeps one.
    pub fn audit_trail(&self) -> Option<&Arc<AuditTrail>> {
        self.trail.as_ref()
    }

    /// Recompute the counters from ledger contents and check the per-identity
    /// credential indexes against the credential store.
    ///
    /// Meant for quiescent registries: writes racing with the scan can show
    /// up as transient discrepancies.
    pub fn reconcile(&self) -> Reconciliation {
        let recorded = self.ctx.metrics.snapshot();
        let identities = self.identities.snapshot();
        let credentials = self.credentials.snapshot();
        let mut discrepancies = Vec::new();

        let mut recomputed = SystemMetrics {
            total_identities: identities.len() as u64,
            total_operations: recorded.total_operations,
            ..SystemMetrics::default()
        };
        let mut indexed = 0u64;
        for (key, record) in &identities {
            if record.kyc_verified {
                recomputed.total_verified_identities += 1;
            }
            let listed = record.credentials.len() as u64;
            if record.credential_count != listed {
                discrepancies.push(format!(
                    "identity {key}: credential_count {} but {listed} indexed",
                    record.credential_count
                ));
            }
            let unique: BTreeSet<&CredentialId> = record.credentials.iter().collect();
            if unique.len() != record.credentials.len() {
                discrepancies.push(format!("identity {key}: duplicate credential index entries"));
            }
            indexed += listed;
        }

        let by_key: HashMap<&Principal, &IdentityRecord> =
            identities.iter().map(|(key, record)| (key, record)).collect();
        for credential in &credentials {
            recomputed.total_credentials += 1;
            if credential.revoked {
                recomputed.total_revoked_credentials += 1;
            }
            let in_index = by_key
                .get(&credential.subject)
                .map(|r| r.credentials.contains(&credential.credential_id))
                .unwrap_or(false);
            if !in_index {
                discrepancies.push(format!(
                    "credential {} missing from index of {}",
                    credential.credential_id, credential.subject
                ));
            }
        }
        if indexed != recomputed.total_credentials {
            discrepancies.push(format!(
                "{indexed} indexed credentials but {} stored",
                recomputed.total_credentials
            ));
        }

        let counters = [
            ("total_identities", recorded.total_identities, recomputed.total_identities),
            (
                "total_verified_identities",
                recorded.total_verified_identities,
                recomputed.total_verified_identities,
            ),
            ("total_credentials", recorded.total_credentials, recomputed.total_credentials),
            (
                "total_revoked_credentials",
                recorded.total_revoked_credentials,
                recomputed.total_revoked_credentials,
            ),
        ];
        for (name, have, want) in counters {
            if have != want {
                discrepancies.push(format!("{name}: recorded {have}, recomputed {want}"));
            }
        }

        Reconciliation {
            recorded,
            recomputed,
            discrepancies,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("identities", &self.identities.len())
            .field("credentials", &self.credentials.len())
            .field("status_lists", &self.status_lists.len())
            .field("paused", &self.ctx.gate.is_paused())
            .finish()
    }
}
