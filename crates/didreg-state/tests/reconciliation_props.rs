// SPDX-License-Identifier: BUSL-1.1
//! # Reconciliation Property Tests
//!
//! Random operation sequences, including ones that fail, must never leave
//! the incremental counters out of step with a full recount, and list
//! versions must only move forward.

use didreg_core::{CredentialId, Hash32, ListId, Principal, Role};
use didreg_state::Registry;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Kyc(u8, bool),
    Issue(u8, u8),
    Revoke(u8),
    Restore(u8),
    Publish(u8, u64),
    TogglePause,
    RevokeIssuer,
    GrantIssuer,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..6).prop_map(Op::Create),
        3 => (0u8..6, any::<bool>()).prop_map(|(i, v)| Op::Kyc(i, v)),
        4 => (0u8..10, 0u8..6).prop_map(|(c, s)| Op::Issue(c, s)),
        2 => (0u8..10).prop_map(Op::Revoke),
        2 => (0u8..10).prop_map(Op::Restore),
        2 => (0u8..2, 0u64..8).prop_map(|(l, v)| Op::Publish(l, v)),
        1 => Just(Op::TogglePause),
        1 => Just(Op::RevokeIssuer),
        1 => Just(Op::GrantIssuer),
    ]
}

fn p(name: &str) -> Principal {
    Principal::new(name).unwrap()
}

fn ident(i: u8) -> Principal {
    p(&format!("id{i}"))
}

fn cred(c: u8) -> CredentialId {
    CredentialId::new(format!("cred{c}")).unwrap()
}

fn list(l: u8) -> ListId {
    ListId::new(format!("list{l}")).unwrap()
}

fn make_registry() -> Registry {
    let registry = Registry::new(p("admin"));
    registry.grant_role(&p("admin"), Role::Registrar, &p("registrar")).unwrap();
    registry.grant_role(&p("admin"), Role::Issuer, &p("issuer")).unwrap();
    for l in 0..2 {
        registry
            .create_list(&p("issuer"), &list(l), "u", Hash32::ZERO, 128, Hash32::ZERO)
            .unwrap();
    }
    registry
}

fn apply(registry: &Registry, op: &Op) {
    let admin = p("admin");
    let issuer = p("issuer");
    let _ = match op {
        Op::Create(i) => registry.create_identity(&ident(*i), &ident(*i), "{}").map(|_| ()),
        Op::Kyc(i, v) => registry.set_kyc_status(&p("registrar"), &ident(*i), *v).map(|_| ()),
        Op::Issue(c, s) => registry
            .issue_credential(&issuer, &cred(*c), &ident(*s), Hash32::from_bytes([*c; 32]))
            .map(|_| ()),
        Op::Revoke(c) => registry
            .revoke_credential(&issuer, &cred(*c), &ident(0), "r")
            .map(|_| ()),
        Op::Restore(c) => registry
            .restore_credential(&issuer, &cred(*c), &ident(0), "r")
            .map(|_| ()),
        Op::Publish(l, v) => registry
            .publish(&issuer, &list(*l), *v, "u", Hash32::from_bytes([*v as u8; 32]))
            .map(|_| ()),
        Op::TogglePause => {
            if registry.is_paused() {
                registry.unpause(&admin)
            } else {
                registry.pause(&admin)
            }
        }
        Op::RevokeIssuer => registry.revoke_role(&admin, Role::Issuer, &issuer).map(|_| ()),
        Op::GrantIssuer => registry.grant_role(&admin, Role::Issuer, &issuer).map(|_| ()),
    };
}

// ---------------------------------------------------------------------------
// 1. Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn counters_always_reconcile(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let registry = make_registry();
        for op in &ops {
            apply(&registry, op);
        }
        let report = registry.reconcile();
        prop_assert!(report.is_consistent(), "{:?}", report.discrepancies);
        prop_assert!(report.recorded.total_revoked_credentials <= report.recorded.total_credentials);
        prop_assert!(report.recorded.total_verified_identities <= report.recorded.total_identities);
    }

    #[test]
    fn list_versions_only_increase(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let registry = make_registry();
        let mut last = [1u64, 1u64];
        for op in &ops {
            apply(&registry, op);
            for l in 0..2u8 {
                let version = registry.get_list(&list(l)).unwrap().version;
                prop_assert!(version >= last[l as usize]);
                last[l as usize] = version;
            }
        }
    }

    #[test]
    fn audit_chain_always_verifies(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let registry = make_registry();
        for op in &ops {
            apply(&registry, op);
        }
        let trail = registry.audit_trail().unwrap();
        prop_assert_eq!(registry.verify_audit_chain(&p("admin")).unwrap(), trail.len());
    }
}
