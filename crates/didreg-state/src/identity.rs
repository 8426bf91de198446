// SPDX-License-Identifier: BUSL-1.1
//! # Identity Ledger
//!
//! DID records keyed by identity key. Records are created once by
//! self-registration and never deleted. Only the owner may replace the
//! document; only a registrar may change the KYC flag.
//!
//! Each record also holds the identity's credential index (credential ids in
//! issuance order). The credential ledger appends to it while holding this
//! ledger's entry guard, so the index, the record's `credential_count`, and
//! the credential store change together.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use didreg_core::{CredentialId, Principal, RecordKind, RegistryError, Role, Timestamp};
use serde::{Deserialize, Serialize};

use crate::audit::OperationKind;
use crate::context::LedgerContext;

/// Stored identity state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub owner: Principal,
    pub document: String,
    pub kyc_verified: bool,
    pub last_activity: Timestamp,
    /// Commit sequence of the last change to this record.
    pub last_change: u64,
    pub credential_count: u64,
    /// Credentials issued to this identity, in issuance order.
    pub credentials: Vec<CredentialId>,
}

/// Read view of an identity, without the credential index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub key: Principal,
    pub owner: Principal,
    pub document: String,
    pub kyc_verified: bool,
    pub last_activity: Timestamp,
    pub last_change: u64,
    pub credential_count: u64,
}

impl IdentityRecord {
    pub fn info(&self, key: &Principal) -> IdentityInfo {
        IdentityInfo {
            key: key.clone(),
            owner: self.owner.clone(),
            document: self.document.clone(),
            kyc_verified: self.kyc_verified,
            last_activity: self.last_activity,
            last_change: self.last_change,
            credential_count: self.credential_count,
        }
    }
}

pub struct IdentityLedger {
    ctx: Arc<LedgerContext>,
    records: DashMap<Principal, IdentityRecord>,
}

impl IdentityLedger {
    pub fn new(ctx: Arc<LedgerContext>) -> Self {
        Self {
            ctx,
            records: DashMap::new(),
        }
    }

    /// Register `key` with an initial document.
    ///
    /// Self-registration: `caller` must be `key`. No role is required.
    pub fn create_identity(
        &self,
        caller: &Principal,
        key: &Principal,
        document: String,
    ) -> Result<IdentityInfo, RegistryError> {
        self.ctx
            .audited(OperationKind::CreateIdentity, key.as_str(), caller, || {
                if caller != key {
                    return Err(RegistryError::Unauthorized {
                        principal: caller.to_string(),
                        requirement: format!("only {key} may register itself"),
                    });
                }
                self.ctx.gate.check_not_paused()?;

                match self.records.entry(key.clone()) {
                    Entry::Occupied(_) => Err(RegistryError::already_exists(RecordKind::Identity, key)),
                    Entry::Vacant(slot) => {
                        let sequence = self.ctx.next_sequence();
                        let record = IdentityRecord {
                            owner: caller.clone(),
                            document,
                            kyc_verified: false,
                            last_activity: Timestamp::now(),
                            last_change: sequence,
                            credential_count: 0,
                            credentials: Vec::new(),
                        };
                        let info = record.info(key);
                        slot.insert(record);
                        self.ctx.commit(
                            OperationKind::CreateIdentity,
                            key.as_str(),
                            caller,
                            sequence,
                            None,
                            |m| m.total_identities += 1,
                        );
                        Ok(info)
                    }
                }
            })
    }

    /// Replace the document. Owner only.
    ///
    /// Checks run as `NotFound`, then owner, then pause.
    pub fn update_document(
        &self,
        caller: &Principal,
        key: &Principal,
        document: String,
    ) -> Result<IdentityInfo, RegistryError> {
        self.ctx
            .audited(OperationKind::UpdateDocument, key.as_str(), caller, || {
                let mut record = self
                    .records
                    .get_mut(key)
                    .ok_or_else(|| RegistryError::not_found(RecordKind::Identity, key))?;
                // Ownership stands in for the role check and precedes pause.
                if &record.owner != caller {
                    return Err(RegistryError::Unauthorized {
                        principal: caller.to_string(),
                        requirement: format!("only the owner of {key} may update its document"),
                    });
                }
                self.ctx.gate.check_not_paused()?;
                let sequence = self.ctx.next_sequence();
                record.document = document;
                record.last_activity = Timestamp::now();
                record.last_change = sequence;
                let info = record.info(key);
                self.ctx.commit(
                    OperationKind::UpdateDocument,
                    key.as_str(),
                    caller,
                    sequence,
                    None,
                    |_| {},
                );
                Ok(info)
            })
    }

    /// Set the KYC flag. Registrar only; setting the current value again
    /// succeeds and still counts as an operation.
    pub fn set_kyc_status(
        &self,
        caller: &Principal,
        key: &Principal,
        verified: bool,
    ) -> Result<IdentityInfo, RegistryError> {
        self.ctx
            .audited(OperationKind::SetKycStatus, key.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Registrar)?;
                self.ctx.gate.check_not_paused()?;
                let mut record = self
                    .records
                    .get_mut(key)
                    .ok_or_else(|| RegistryError::not_found(RecordKind::Identity, key))?;

                let previous = record.kyc_verified;
                let sequence = self.ctx.next_sequence();
                record.kyc_verified = verified;
                record.last_activity = Timestamp::now();
                record.last_change = sequence;
                let info = record.info(key);
                self.ctx.commit(
                    OperationKind::SetKycStatus,
                    key.as_str(),
                    caller,
                    sequence,
                    Some(serde_json::json!({ "previous": previous, "verified": verified })),
                    |m| match (previous, verified) {
                        (false, true) => m.total_verified_identities += 1,
                        (true, false) => m.total_verified_identities -= 1,
                        _ => {}
                    },
                );
                Ok(info)
            })
    }

    pub fn get_identity_info(&self, key: &Principal) -> Result<IdentityInfo, RegistryError> {
        self.records
            .get(key)
            .map(|r| r.info(key))
            .ok_or_else(|| RegistryError::not_found(RecordKind::Identity, key))
    }

    pub fn exists(&self, key: &Principal) -> bool {
        self.records.contains_key(key)
    }

    /// Credential ids issued to `key`, in issuance order. Empty for an
    /// unknown identity.
    pub fn credentials_of(&self, key: &Principal) -> Vec<CredentialId> {
        self.records
            .get(key)
            .map(|r| r.credentials.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record, for reconciliation.
    pub fn snapshot(&self) -> Vec<(Principal, IdentityRecord)> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub(crate) fn records(&self) -> &DashMap<Principal, IdentityRecord> {
        &self.records
    }
}

impl std::fmt::Debug for IdentityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityLedger")
            .field("identities", &self.records.len())
            .finish()
    }
}
