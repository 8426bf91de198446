// SPDX-License-Identifier: BUSL-1.1
//! # Concurrent Access Tests
//!
//! Many threads hammer one `Registry`. Per-key operations must serialize,
//! so same-key races produce exactly one winner, and the counters must
//! match a full recount once the threads join.

use std::sync::{Arc, Barrier};
use std::thread;

use didreg_core::{CredentialId, Hash32, ListId, Principal, Role};
use didreg_state::Registry;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const THREADS: usize = 8;

fn p(name: &str) -> Principal {
    Principal::new(name).unwrap()
}

fn make_registry() -> Arc<Registry> {
    let registry = Registry::new(p("admin"));
    registry.grant_role(&p("admin"), Role::Issuer, &p("issuer")).unwrap();
    registry.grant_role(&p("admin"), Role::Registrar, &p("registrar")).unwrap();
    Arc::new(registry)
}

/// Run `f(thread_index)` on `THREADS` threads released together.
fn race<T, F>(registry: &Arc<Registry>, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(&Registry, usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREADS));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                (*f)(&*registry, i)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// ---------------------------------------------------------------------------
// 1. Same-key races
// ---------------------------------------------------------------------------

#[test]
fn concurrent_create_same_key_has_one_winner() {
    let registry = make_registry();
    let results = race(&registry, |r, _| {
        let key = p("contested");
        r.create_identity(&key, &key, "{}")
    });
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }
    assert_eq!(registry.get_system_metrics().total_identities, 1);
}

#[test]
fn concurrent_issue_same_id_has_one_winner() {
    let registry = make_registry();
    for i in 0..THREADS {
        let who = p(&format!("s{i}"));
        registry.create_identity(&who, &who, "{}").unwrap();
    }
    // Every thread targets a different subject with the same credential id.
    let results = race(&registry, |r, i| {
        r.issue_credential(
            &p("issuer"),
            &CredentialId::new("shared").unwrap(),
            &p(&format!("s{i}")),
            Hash32::from_bytes([i as u8; 32]),
        )
    });
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let indexed: usize = (0..THREADS)
        .map(|i| registry.get_identity_credentials(&p(&format!("s{i}"))).len())
        .sum();
    assert_eq!(indexed, 1);
    assert!(registry.reconcile().is_consistent());
}

#[test]
fn concurrent_revoke_has_one_winner() {
    let registry = make_registry();
    registry.create_identity(&p("s"), &p("s"), "{}").unwrap();
    let id = CredentialId::new("C1").unwrap();
    registry
        .issue_credential(&p("issuer"), &id, &p("s"), Hash32::from_bytes([1; 32]))
        .unwrap();

    let results = race(&registry, |r, _| {
        r.revoke_credential(&p("issuer"), &CredentialId::new("C1").unwrap(), &p("s"), "race")
    });
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(registry.get_system_metrics().total_revoked_credentials, 1);
}

#[test]
fn concurrent_kyc_toggles_keep_count_consistent() {
    let registry = make_registry();
    registry.create_identity(&p("s"), &p("s"), "{}").unwrap();
    race(&registry, |r, i| {
        for round in 0..50 {
            let _ = r.set_kyc_status(&p("registrar"), &p("s"), (i + round) % 2 == 0);
        }
    });
    let verified = registry.get_identity_info(&p("s")).unwrap().kyc_verified;
    assert_eq!(
        registry.get_system_metrics().total_verified_identities,
        u64::from(verified)
    );
    assert!(registry.reconcile().is_consistent());
}

#[test]
fn concurrent_publish_versions_never_regress() {
    let registry = make_registry();
    let list = ListId::new("L1").unwrap();
    registry
        .create_list(&p("issuer"), &list, "u1", Hash32::from_bytes([0; 32]), 64, Hash32::ZERO)
        .unwrap();

    race(&registry, |r, i| {
        let list = ListId::new("L1").unwrap();
        for v in 2..40u64 {
            let _ = r.publish(
                &p("issuer"),
                &list,
                v,
                format!("u{v}-{i}"),
                Hash32::from_bytes([v as u8; 32]),
            );
        }
    });
    let stored = registry.get_list(&list).unwrap();
    assert_eq!(stored.version, 39);
    assert_eq!(stored.hash, Hash32::from_bytes([39; 32]));
}

#[test]
fn concurrent_pause_has_one_winner() {
    let registry = make_registry();
    let results = race(&registry, |r, _| r.pause(&p("admin")));
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(registry.is_paused());
}

// ---------------------------------------------------------------------------
// 2. Disjoint keys
// ---------------------------------------------------------------------------

#[test]
fn disjoint_workloads_all_succeed() {
    let registry = make_registry();
    race(&registry, |r, i| {
        for n in 0..25 {
            let who = p(&format!("t{i}-{n}"));
            r.create_identity(&who, &who, "{}").unwrap();
            r.set_kyc_status(&p("registrar"), &who, true).unwrap();
            let id = CredentialId::new(format!("c{i}-{n}")).unwrap();
            r.issue_credential(&p("issuer"), &id, &who, Hash32::from_bytes([n as u8; 32]))
                .unwrap();
            if n % 5 == 0 {
                r.revoke_credential(&p("issuer"), &id, &who, "rotation").unwrap();
            }
        }
    });

    let total = (THREADS * 25) as u64;
    let revoked = (THREADS * 5) as u64;
    let m = registry.get_system_metrics();
    assert_eq!(m.as_tuple(), (total, total, total, revoked, total * 3 + revoked));

    let report = registry.reconcile();
    assert!(report.is_consistent(), "{:?}", report.discrepancies);
}

#[test]
fn audit_chain_survives_concurrent_writers() {
    let registry = make_registry();
    race(&registry, |r, i| {
        for n in 0..20 {
            let who = p(&format!("a{i}-{n}"));
            r.create_identity(&who, &who, "{}").unwrap();
        }
    });
    let verified = registry.verify_audit_chain(&p("admin")).unwrap();
    // Bootstrap grant, two staff grants, and every create.
    assert_eq!(verified, 3 + THREADS * 20);
}
