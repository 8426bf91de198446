// SPDX-License-Identifier: BUSL-1.1
//! # Credential Ledger
//!
//! Revocation records keyed by credential id.
//!
//! ```text
//! NonExistent --issue--> Active --revoke--> Revoked --restore--> Active --> ...
//! ```
//!
//! Issuance is write-once per id: a second issue fails with `AlreadyExists`
//! whatever its subject or hash. Revoke and restore alternate indefinitely;
//! a revoke of a revoked credential (or restore of an active one) is
//! rejected rather than silently accepted, so an earlier revocation reason
//! is never overwritten by a no-op.
//!
//! ## Locking
//!
//! Issuance takes the subject's identity entry guard first, then the
//! credential entry. Revoke and restore take only the credential entry.
//! Metrics and audit are always acquired last.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use didreg_core::{CredentialId, Hash32, Principal, RecordKind, RegistryError, Role, Timestamp};
use serde::{Deserialize, Serialize};

use crate::audit::OperationKind;
use crate::context::LedgerContext;
use crate::identity::IdentityLedger;

/// Revocation state of one issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub credential_id: CredentialId,
    pub content_hash: Hash32,
    pub revoked: bool,
    /// Reason given by the last revoke or restore; empty until then.
    pub reason: String,
    /// Whoever last changed the revoked state (the issuer at issuance).
    pub revoker: Principal,
    pub updated_at: Timestamp,
    pub subject: Principal,
    pub issuer: Principal,
    pub issued_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Revoked,
    Unknown,
}

/// Result of checking a presented credential against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialVerification {
    pub credential_id: CredentialId,
    pub valid: bool,
    pub status: CredentialStatus,
    pub hash_matches: bool,
    pub subject: Option<Principal>,
    pub issuer: Option<Principal>,
    pub issued_at: Option<Timestamp>,
    pub errors: Vec<String>,
}

pub struct CredentialLedger {
    ctx: Arc<LedgerContext>,
    identities: Arc<IdentityLedger>,
    records: DashMap<CredentialId, RevocationRecord>,
}

impl CredentialLedger {
    pub fn new(ctx: Arc<LedgerContext>, identities: Arc<IdentityLedger>) -> Self {
        Self {
            ctx,
            identities,
            records: DashMap::new(),
        }
    }

    /// Issue `id` to `subject`. Issuer only.
    ///
    /// An id that already exists is rejected with `AlreadyExists` before the
    /// subject is looked up, so re-issuing is refused regardless of the
    /// subject argument.
    pub fn issue(
        &self,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        content_hash: Hash32,
    ) -> Result<RevocationRecord, RegistryError> {
        self.ctx
            .audited(OperationKind::IssueCredential, id.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Issuer)?;
                self.ctx.gate.check_not_paused()?;
                if self.records.contains_key(id) {
                    return Err(RegistryError::already_exists(RecordKind::Credential, id));
                }

                let mut identity = self
                    .identities
                    .records()
                    .get_mut(subject)
                    .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;

                // Re-check under the guards: another issuer may have won the race.
                let slot = match self.records.entry(id.clone()) {
                    Entry::Occupied(_) => {
                        return Err(RegistryError::already_exists(RecordKind::Credential, id))
                    }
                    Entry::Vacant(slot) => slot,
                };

                let sequence = self.ctx.next_sequence();
                let now = Timestamp::now();
                let record = RevocationRecord {
                    credential_id: id.clone(),
                    content_hash,
                    revoked: false,
                    reason: String::new(),
                    revoker: caller.clone(),
                    updated_at: now,
                    subject: subject.clone(),
                    issuer: caller.clone(),
                    issued_at: now,
                };
                slot.insert(record.clone());
                identity.credentials.push(id.clone());
                identity.credential_count += 1;
                identity.last_activity = now;
                identity.last_change = sequence;

                self.ctx.commit(
                    OperationKind::IssueCredential,
                    id.as_str(),
                    caller,
                    sequence,
                    Some(serde_json::json!({
                        "subject": subject,
                        "content_hash": content_hash,
                    })),
                    |m| m.total_credentials += 1,
                );
                Ok(record)
            })
    }

    /// Revoke an active credential. Issuer only.
    ///
    /// `subject` is recorded in the audit event but not checked against the
    /// stored subject.
    pub fn revoke(
        &self,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        reason: String,
    ) -> Result<RevocationRecord, RegistryError> {
        self.toggle(OperationKind::RevokeCredential, caller, id, subject, reason, true)
    }

    /// Restore a revoked credential. Issuer only.
    pub fn restore(
        &self,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        reason: String,
    ) -> Result<RevocationRecord, RegistryError> {
        self.toggle(OperationKind::RestoreCredential, caller, id, subject, reason, false)
    }

    fn toggle(
        &self,
        kind: OperationKind,
        caller: &Principal,
        id: &CredentialId,
        subject: &Principal,
        reason: String,
        revoke: bool,
    ) -> Result<RevocationRecord, RegistryError> {
        self.ctx.audited(kind, id.as_str(), caller, || {
            self.ctx.gate.authorize(caller, Role::Issuer)?;
            self.ctx.gate.check_not_paused()?;
            let mut record = self
                .records
                .get_mut(id)
                .ok_or_else(|| RegistryError::not_found(RecordKind::Credential, id))?;

            match (record.revoked, revoke) {
                (true, true) => return Err(RegistryError::AlreadyRevoked(id.to_string())),
                (false, false) => return Err(RegistryError::NotRevoked(id.to_string())),
                _ => {}
            }

            let sequence = self.ctx.next_sequence();
            record.revoked = revoke;
            record.reason = reason;
            record.revoker = caller.clone();
            record.updated_at = Timestamp::now();
            let updated = record.clone();

            self.ctx.commit(
                kind,
                id.as_str(),
                caller,
                sequence,
                Some(serde_json::json!({
                    "subject": subject,
                    "reason": updated.reason,
                })),
                |m| {
                    if revoke {
                        m.total_revoked_credentials += 1;
                    } else {
                        m.total_revoked_credentials -= 1;
                    }
                },
            );
            Ok(updated)
        })
    }

    pub fn is_revoked(&self, id: &CredentialId) -> Result<bool, RegistryError> {
        self.records
            .get(id)
            .map(|r| r.revoked)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Credential, id))
    }

    pub fn revocation(&self, id: &CredentialId) -> Result<RevocationRecord, RegistryError> {
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RegistryError::not_found(RecordKind::Credential, id))
    }

    /// Check a presented credential: it must exist, carry the stored content
    /// hash, and not be revoked.
    pub fn verify(&self, id: &CredentialId, presented_hash: &Hash32) -> CredentialVerification {
        let Some(record) = self.records.get(id) else {
            return CredentialVerification {
                credential_id: id.clone(),
                valid: false,
                status: CredentialStatus::Unknown,
                hash_matches: false,
                subject: None,
                issuer: None,
                issued_at: None,
                errors: vec![format!("credential {id} is not registered")],
            };
        };

        let hash_matches = record.content_hash == *presented_hash;
        let mut errors = Vec::new();
        if !hash_matches {
            errors.push("content hash does not match the issued credential".to_string());
        }
        if record.revoked {
            errors.push(format!("credential revoked: {}", record.reason));
        }
        CredentialVerification {
            credential_id: id.clone(),
            valid: errors.is_empty(),
            status: if record.revoked {
                CredentialStatus::Revoked
            } else {
                CredentialStatus::Active
            },
            hash_matches,
            subject: Some(record.subject.clone()),
            issuer: Some(record.issuer.clone()),
            issued_at: Some(record.issued_at),
            errors,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RevocationRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}

impl std::fmt::Debug for CredentialLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLedger")
            .field("credentials", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditTrail;

    fn p(name: &str) -> Principal {
        Principal::new(name).unwrap()
    }

    fn cid(id: &str) -> CredentialId {
        CredentialId::new(id).unwrap()
    }

    fn hash(byte: u8) -> Hash32 {
        Hash32::from_bytes([byte; 32])
    }

    struct Fixture {
        ctx: Arc<LedgerContext>,
        identities: Arc<IdentityLedger>,
        credentials: CredentialLedger,
    }

    fn fixture() -> Fixture {
        let ctx = Arc::new(LedgerContext::new(Arc::new(AuditTrail::default())));
        ctx.gate.insert_role(&p("issuer"), Role::Issuer);
        let identities = Arc::new(IdentityLedger::new(ctx.clone()));
        identities
            .create_identity(&p("alice"), &p("alice"), "{}".into())
            .unwrap();
        let credentials = CredentialLedger::new(ctx.clone(), identities.clone());
        Fixture {
            ctx,
            identities,
            credentials,
        }
    }

    #[test]
    fn issue_indexes_credential_under_subject() {
        let f = fixture();
        let record = f
            .credentials
            .issue(&p("issuer"), &cid("C1"), &p("alice"), hash(1))
            .unwrap();
        assert!(!record.revoked);
        assert_eq!(record.reason, "");
        assert_eq!(record.revoker, p("issuer"));
        assert_eq!(f.identities.credentials_of(&p("alice")), vec![cid("C1")]);
        assert_eq!(
            f.identities.get_identity_info(&p("alice")).unwrap().credential_count,
            1
        );
        assert_eq!(f.ctx.metrics.snapshot().total_credentials, 1);
    }

    #[test]
    fn issuance_is_write_once() {
        let f = fixture();
        f.identities
            .create_identity(&p("bob"), &p("bob"), "{}".into())
            .unwrap();
        f.credentials
            .issue(&p("issuer"), &cid("C1"), &p("alice"), hash(1))
            .unwrap();
        for subject in ["alice", "bob", "nobody"] {
            let err = f
                .credentials
                .issue(&p("issuer"), &cid("C1"), &p(subject), hash(2))
                .unwrap_err();
            assert_eq!(err.code(), "ALREADY_EXISTS");
        }
        assert_eq!(f.credentials.revocation(&cid("C1")).unwrap().content_hash, hash(1));
        assert!(f.identities.credentials_of(&p("bob")).is_empty());
    }

    #[test]
    fn issue_to_unknown_subject() {
        let f = fixture();
        let err = f
            .credentials
            .issue(&p("issuer"), &cid("C1"), &p("ghost"), hash(1))
            .unwrap_err();
        assert_eq!(err, RegistryError::SubjectNotFound("ghost".into()));
        assert!(f.credentials.is_empty());
    }

    #[test]
    fn revoke_restore_alternation() {
        let f = fixture();
        let issuer = p("issuer");
        let id = cid("C1");
        f.credentials.issue(&issuer, &id, &p("alice"), hash(1)).unwrap();

        f.credentials.revoke(&issuer, &id, &p("alice"), "lost".into()).unwrap();
        assert_eq!(
            f.credentials
                .revoke(&issuer, &id, &p("alice"), "again".into())
                .unwrap_err()
                .code(),
            "ALREADY_REVOKED"
        );
        f.credentials.restore(&issuer, &id, &p("alice"), "found".into()).unwrap();
        assert_eq!(
            f.credentials
                .restore(&issuer, &id, &p("alice"), "again".into())
                .unwrap_err()
                .code(),
            "NOT_REVOKED"
        );
        f.credentials.revoke(&issuer, &id, &p("alice"), "fraud".into()).unwrap();

        assert!(f.credentials.is_revoked(&id).unwrap());
        assert_eq!(f.credentials.revocation(&id).unwrap().reason, "fraud");
        assert_eq!(f.ctx.metrics.snapshot().total_revoked_credentials, 1);
        assert_eq!(f.ctx.metrics.snapshot().total_credentials, 1);
    }

    #[test]
    fn revoke_unknown_credential() {
        let f = fixture();
        let err = f
            .credentials
            .revoke(&p("issuer"), &cid("nope"), &p("alice"), "x".into())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(f.credentials.is_revoked(&cid("nope")).unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn non_issuer_cannot_touch_credentials() {
        let f = fixture();
        f.credentials
            .issue(&p("issuer"), &cid("C1"), &p("alice"), hash(1))
            .unwrap();
        let before = f.ctx.metrics.snapshot();
        let err = f
            .credentials
            .revoke(&p("alice"), &cid("C1"), &p("alice"), "self".into())
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(f.ctx.metrics.snapshot(), before);
        assert!(!f.credentials.is_revoked(&cid("C1")).unwrap());
    }

    #[test]
    fn verify_reports_each_failure() {
        let f = fixture();
        let issuer = p("issuer");
        f.credentials.issue(&issuer, &cid("C1"), &p("alice"), hash(1)).unwrap();

        let ok = f.credentials.verify(&cid("C1"), &hash(1));
        assert!(ok.valid);
        assert_eq!(ok.status, CredentialStatus::Active);
        assert_eq!(ok.issuer, Some(issuer.clone()));

        let wrong_hash = f.credentials.verify(&cid("C1"), &hash(9));
        assert!(!wrong_hash.valid);
        assert!(!wrong_hash.hash_matches);

        f.credentials.revoke(&issuer, &cid("C1"), &p("alice"), "expired".into()).unwrap();
        let revoked = f.credentials.verify(&cid("C1"), &hash(1));
        assert!(!revoked.valid);
        assert_eq!(revoked.status, CredentialStatus::Revoked);
        assert!(revoked.errors[0].contains("expired"));

        let unknown = f.credentials.verify(&cid("C404"), &hash(1));
        assert_eq!(unknown.status, CredentialStatus::Unknown);
        assert!(!unknown.valid);
    }
}
