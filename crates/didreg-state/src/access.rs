// SPDX-License-Identifier: BUSL-1.1
//! # Access Control Gate
//!
//! Role membership and the global pause flag. Every mutating ledger call
//! runs `authorize` (or an ownership check standing in for it) and then
//! `check_not_paused`, in that order, before reading or writing ledger state.
//! The fixed order keeps error reporting deterministic: an unauthorized
//! caller always sees `Unauthorized`, whether or not the registry is paused.
//!
//! Roles are a set per principal, stored in a `DashMap` so role checks on
//! different principals never contend.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use didreg_core::{Principal, RegistryError, Role};

#[derive(Debug, Default)]
pub struct AccessGate {
    roles: DashMap<Principal, BTreeSet<Role>>,
    paused: AtomicBool,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.roles
            .get(principal)
            .map(|set| set.contains(&role))
            .unwrap_or(false)
    }

    pub fn roles_of(&self, principal: &Principal) -> BTreeSet<Role> {
        self.roles
            .get(principal)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }

    /// Principals holding `role`, sorted.
    pub fn members(&self, role: Role) -> Vec<Principal> {
        let mut members: Vec<Principal> = self
            .roles
            .iter()
            .filter(|entry| entry.value().contains(&role))
            .map(|entry| entry.key().clone())
            .collect();
        members.sort();
        members
    }

    /// Fail with `Unauthorized` unless `principal` holds `role`.
    pub fn authorize(&self, principal: &Principal, role: Role) -> Result<(), RegistryError> {
        if self.has_role(principal, role) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized {
                principal: principal.to_string(),
                requirement: format!("role '{role}' required"),
            })
        }
    }

    /// Fail with `Unauthorized` unless `principal` holds at least one of `roles`.
    pub fn authorize_any(&self, principal: &Principal, roles: &[Role]) -> Result<(), RegistryError> {
        let held = self.roles_of(principal);
        if roles.iter().any(|r| held.contains(r)) {
            return Ok(());
        }
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(RegistryError::Unauthorized {
            principal: principal.to_string(),
            requirement: format!("one of roles [{}] required", names.join(", ")),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn check_not_paused(&self) -> Result<(), RegistryError> {
        if self.is_paused() {
            Err(RegistryError::SystemPaused)
        } else {
            Ok(())
        }
    }

    /// Run `f` on `principal`'s role set under its entry guard. Sets left
    /// empty are dropped afterwards.
    pub(crate) fn update_roles<T>(
        &self,
        principal: &Principal,
        f: impl FnOnce(&mut BTreeSet<Role>) -> T,
    ) -> T {
        let mut set = self.roles.entry(principal.clone()).or_default();
        let out = f(set.value_mut());
        drop(set);
        self.roles.remove_if(principal, |_, set| set.is_empty());
        out
    }

    /// Add `role` to `principal`. Returns `false` if it was already held.
    #[cfg(test)]
    pub(crate) fn insert_role(&self, principal: &Principal, role: Role) -> bool {
        self.update_roles(principal, |set| set.insert(role))
    }

    /// Remove `role` from `principal`. Returns `false` if it was not held.
    #[cfg(test)]
    pub(crate) fn remove_role(&self, principal: &Principal, role: Role) -> bool {
        self.update_roles(principal, |set| set.remove(&role))
    }

    /// Flip the pause flag from `!paused` to `paused`.
    ///
    /// Pausing a paused registry fails with `SystemPaused`; unpausing a
    /// running one fails with `NotPaused`.
    pub(crate) fn transition_pause(&self, paused: bool) -> Result<(), RegistryError> {
        self.paused
            .compare_exchange(!paused, paused, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                if paused {
                    RegistryError::SystemPaused
                } else {
                    RegistryError::NotPaused
                }
            })
    }
}
