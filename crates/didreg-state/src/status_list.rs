// SPDX-License-Identifier: BUSL-1.1
//! # Status List Registry
//!
//! Named, versioned pointers to externally hosted credential-status
//! documents. A list starts at version 1 under the issuer that created it.
//!
//! - Publishing requires the issuer role *and* being the list's controller,
//!   and the new version must be strictly greater than the stored one.
//! - Control moves only through the admin role; a controller cannot hand a
//!   list to someone else by itself.
//!
//! Publish overwrites uri, hash, and version under one entry guard, so no
//! reader ever sees a bumped version with the old hash.
//!
//! Each mutation emits a [`StatusListEvent`] (as the audit event's details)
//! carrying the list's derived key, a SHA-256 of the canonical list id, for
//! subscribers that index lists by fixed-width key.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use didreg_core::{ContentDigest, Hash32, ListId, Principal, RecordKind, RegistryError, Role, Timestamp};
use serde::{Deserialize, Serialize};

use crate::audit::OperationKind;
use crate::context::LedgerContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusListRecord {
    pub list_id: ListId,
    pub hash: Hash32,
    pub uri: String,
    pub size: u64,
    pub purpose: Hash32,
    pub version: u64,
    pub controller: Principal,
    /// Always `true` for a stored record; absent lists are `NotFound`.
    pub exists: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Notifications published with status list mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusListEvent {
    Created {
        key: ContentDigest,
        list_id: ListId,
        uri: String,
        hash: Hash32,
        version: u64,
        size: u64,
        purpose: Hash32,
        issuer: Principal,
    },
    Updated {
        key: ContentDigest,
        list_id: ListId,
        uri: String,
        hash: Hash32,
        version: u64,
        issuer: Principal,
    },
    ControllerTransferred {
        key: ContentDigest,
        list_id: ListId,
        old_controller: Principal,
        new_controller: Principal,
    },
}

fn event_details(event: &StatusListEvent) -> Result<serde_json::Value, RegistryError> {
    serde_json::to_value(event).map_err(|e| RegistryError::Integrity(e.to_string()))
}

pub struct StatusListRegistry {
    ctx: Arc<LedgerContext>,
    lists: DashMap<ListId, StatusListRecord>,
}

impl StatusListRegistry {
    pub fn new(ctx: Arc<LedgerContext>) -> Self {
        Self {
            ctx,
            lists: DashMap::new(),
        }
    }

    /// Create a list at version 1, controlled by `caller`. Issuer only.
    pub fn create(
        &self,
        caller: &Principal,
        list_id: &ListId,
        uri: String,
        hash: Hash32,
        size: u64,
        purpose: Hash32,
    ) -> Result<StatusListRecord, RegistryError> {
        self.ctx
            .audited(OperationKind::CreateStatusList, list_id.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Issuer)?;
                self.ctx.gate.check_not_paused()?;
                let key = list_id.key()?;

                let slot = match self.lists.entry(list_id.clone()) {
                    Entry::Occupied(_) => {
                        return Err(RegistryError::already_exists(RecordKind::StatusList, list_id))
                    }
                    Entry::Vacant(slot) => slot,
                };
                let now = Timestamp::now();
                let record = StatusListRecord {
                    list_id: list_id.clone(),
                    hash,
                    uri,
                    size,
                    purpose,
                    version: 1,
                    controller: caller.clone(),
                    exists: true,
                    created_at: now,
                    updated_at: now,
                };
                let details = event_details(&StatusListEvent::Created {
                    key,
                    list_id: list_id.clone(),
                    uri: record.uri.clone(),
                    hash,
                    version: 1,
                    size,
                    purpose,
                    issuer: caller.clone(),
                })?;
                slot.insert(record.clone());

                let sequence = self.ctx.next_sequence();
                self.ctx.commit(
                    OperationKind::CreateStatusList,
                    list_id.as_str(),
                    caller,
                    sequence,
                    Some(details),
                    |_| {},
                );
                Ok(record)
            })
    }

    /// Publish a new version. The caller must hold the issuer role and
    /// control the list; `version` must exceed the stored version.
    pub fn publish(
        &self,
        caller: &Principal,
        list_id: &ListId,
        version: u64,
        uri: String,
        hash: Hash32,
    ) -> Result<StatusListRecord, RegistryError> {
        self.ctx
            .audited(OperationKind::PublishStatusList, list_id.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Issuer)?;
                self.ctx.gate.check_not_paused()?;
                let key = list_id.key()?;
                let mut record = self
                    .lists
                    .get_mut(list_id)
                    .ok_or_else(|| RegistryError::not_found(RecordKind::StatusList, list_id))?;

                if &record.controller != caller {
                    return Err(RegistryError::NotController {
                        list_id: list_id.to_string(),
                        caller: caller.to_string(),
                        controller: record.controller.to_string(),
                    });
                }
                if version <= record.version {
                    return Err(RegistryError::InvalidVersion {
                        list_id: list_id.to_string(),
                        stored: record.version,
                        attempted: version,
                    });
                }

                let details = event_details(&StatusListEvent::Updated {
                    key,
                    list_id: list_id.clone(),
                    uri: uri.clone(),
                    hash,
                    version,
                    issuer: caller.clone(),
                })?;
                record.uri = uri;
                record.hash = hash;
                record.version = version;
                record.updated_at = Timestamp::now();
                let updated = record.clone();

                let sequence = self.ctx.next_sequence();
                self.ctx.commit(
                    OperationKind::PublishStatusList,
                    list_id.as_str(),
                    caller,
                    sequence,
                    Some(details),
                    |_| {},
                );
                Ok(updated)
            })
    }

    /// Reassign a list's controller. Admin only.
    pub fn transfer_controller(
        &self,
        caller: &Principal,
        list_id: &ListId,
        new_controller: &Principal,
    ) -> Result<StatusListRecord, RegistryError> {
        self.ctx
            .audited(OperationKind::TransferListController, list_id.as_str(), caller, || {
                self.ctx.gate.authorize(caller, Role::Admin)?;
                self.ctx.gate.check_not_paused()?;
                let key = list_id.key()?;
                let mut record = self
                    .lists
                    .get_mut(list_id)
                    .ok_or_else(|| RegistryError::not_found(RecordKind::StatusList, list_id))?;

                let details = event_details(&StatusListEvent::ControllerTransferred {
                    key,
                    list_id: list_id.clone(),
                    old_controller: record.controller.clone(),
                    new_controller: new_controller.clone(),
                })?;
                record.controller = new_controller.clone();
                record.updated_at = Timestamp::now();
                let updated = record.clone();

                let sequence = self.ctx.next_sequence();
                self.ctx.commit(
                    OperationKind::TransferListController,
                    list_id.as_str(),
                    caller,
                    sequence,
                    Some(details),
                    |_| {},
                );
                Ok(updated)
            })
    }

    pub fn get(&self, list_id: &ListId) -> Result<StatusListRecord, RegistryError> {
        self.lists
            .get(list_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RegistryError::not_found(RecordKind::StatusList, list_id))
    }

    /// Every list id, sorted.
    pub fn list_ids(&self) -> Vec<ListId> {
        let mut ids: Vec<ListId> = self.lists.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

impl std::fmt::Debug for StatusListRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusListRegistry")
            .field("lists", &self.lists.len())
            .finish()
    }
}
