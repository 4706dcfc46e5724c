// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]
mod common;

use std::sync::Arc;

use common::{
    build, license, licensed_job, machine, pool_of, port, port_requiring, reciprocal, record_with,
};
use gang_core::{
    negotiate, AttributeRecord, Direction, Expr, Gang, GangMatcher, MatchConfig, OfferPool,
    PeerRef, ResourceRecord,
};

fn matcher(pool: OfferPool) -> GangMatcher {
    GangMatcher::new(pool, MatchConfig::default())
}

fn pool_keys(m: &GangMatcher) -> Vec<i64> {
    m.pool().keys().collect()
}

/// Job with one `cpu` port wanting a machine.
fn job(key: i64) -> ResourceRecord {
    build(
        key,
        record_with(
            AttributeRecord::new().with("Type", Expr::lit("Job")),
            vec![port_requiring(
                "cpu",
                Expr::select("cpu", "Type").equals(Expr::lit("Machine")),
            )],
        ),
    )
}

/// Machine with two interchangeable ports `p` and `q`, each serving a job or
/// a disk.
fn relay(key: i64) -> ResourceRecord {
    let side = |label: &str| {
        port_requiring(
            label,
            Expr::select(label, "Type")
                .equals(Expr::lit("Job"))
                .or(Expr::select(label, "Type").equals(Expr::lit("Disk"))),
        )
        .with("Type", Expr::lit("Machine"))
    };
    build(key, record_with(AttributeRecord::new(), vec![side("p"), side("q")]))
}

fn disk(key: i64) -> ResourceRecord {
    build(
        key,
        record_with(
            AttributeRecord::new(),
            vec![port_requiring(
                "host",
                Expr::select("host", "Type").equals(Expr::lit("Machine")),
            )
            .with("Type", Expr::lit("Disk"))],
        ),
    )
}

/// Label of the port the root's first dock is bound to.
fn root_peer_label(gang: &Gang) -> String {
    gang.root.ports[0].peer.as_ref().unwrap().label.clone()
}

#[test]
fn reciprocal_pair_binds_as_self_link() {
    let mut m = matcher(pool_of([reciprocal(2, "match")]));
    let root = m.root(reciprocal(1, "match"));
    assert!(m.try_match(root, Direction::Advance));
    assert!(m.pool().is_empty());

    let dock = m.node(root).unwrap().dock(0).unwrap().clone();
    assert!(dock.is_satisfied());
    let child = dock.bound_child().unwrap();
    assert_eq!(m.node(child).unwrap().self_linked_dock(), Some(0));
    assert_eq!(dock.linked_dock_index(), Some(0));

    let gang = m.gang(root).unwrap();
    assert_eq!(gang.keys(), vec![1, 2]);
    let binding = &gang.root.ports[0];
    assert_eq!(
        binding.peer,
        Some(PeerRef {
            key: 2,
            label: "other".into()
        })
    );
    let member = binding.member.as_ref().unwrap();
    assert_eq!(
        member.ports[0].peer,
        Some(PeerRef {
            key: 1,
            label: "other".into()
        })
    );
    assert!(member.ports[0].member.is_none());
}

#[test]
fn empty_pool_fails_and_stays_empty() {
    let mut m = matcher(OfferPool::new());
    let root = m.root(reciprocal(1, "match"));
    assert!(!m.try_match(root, Direction::Advance));
    assert!(m.pool().is_empty());
    let dock = m.node(root).unwrap().dock(0).unwrap();
    assert!(!dock.is_satisfied());
    assert!(dock.bound_child().is_none());
}

#[test]
fn failed_match_is_repeatable_and_conserves_the_pool() {
    let mut m = matcher(pool_of([reciprocal(2, "nomatch"), reciprocal(3, "other")]));
    let root = m.root(reciprocal(1, "match"));
    let before: Vec<i64> = m.pool().keys().collect();
    assert!(!m.try_match(root, Direction::Advance));
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), before);
    let resume_after_first = m.node(root).unwrap().dock(0).unwrap().resume_key();
    assert!(!m.try_match(root, Direction::Advance));
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), before);
    assert_eq!(
        m.node(root).unwrap().dock(0).unwrap().resume_key(),
        resume_after_first
    );
    assert_eq!(m.arena().len(), 1);
}

#[test]
fn successful_children_pass_their_reciprocal_test() {
    let mut m = matcher(pool_of([machine(2, Some("m1")), license(3, "m1")]));
    let root = m.root(licensed_job(1));
    assert!(m.try_match(root, Direction::Advance));
    let node = m.node(root).unwrap();
    for dock in node.docks() {
        let child = dock.bound_child().unwrap();
        let link = m.node(child).unwrap().self_linked_dock().unwrap();
        assert!(m.two_party_test(child, link).is_true());
    }
}

#[test]
fn retreat_leaves_unused_candidates_in_the_pool() {
    // The first machine has no license; the search must back up to `cpu`.
    let mut m = matcher(pool_of([
        machine(2, Some("m1")),
        machine(3, Some("m2")),
        license(4, "m2"),
    ]));
    let root = m.root(licensed_job(1));
    assert!(m.try_match(root, Direction::Advance));
    assert_eq!(m.gang(root).unwrap().keys(), vec![1, 3, 4]);
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), vec![2]);
    assert!(m.stats().releases > 0);
}

#[test]
fn finish_consumes_and_release_restores() {
    let mut m = matcher(pool_of([
        licensed_job(1),
        machine(2, Some("m1")),
        license(3, "m1"),
        reciprocal(4, "match"),
    ]));
    let root = m.claim_root(1).unwrap();
    assert!(m.try_match(root, Direction::Advance));
    let consumed = m.finish(root);
    assert_eq!(consumed, vec![1, 3, 2]);
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), vec![4]);
    assert!(m.node(root).is_none());

    let lonely = m.claim_root(4).unwrap();
    assert!(!m.try_match(lonely, Direction::Advance));
    assert!(m.release(lonely));
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), vec![4]);
    assert!(m.arena().is_empty());
}

#[test]
fn undefined_first_port_prunes_the_whole_candidate() {
    // The candidate's second port would satisfy `peer.Kind == "gpu"`, but its
    // first port has no `Kind`, so the candidate is dropped without looking
    // further.
    let root_rec = build(
        1,
        record_with(
            AttributeRecord::new(),
            vec![port_requiring(
                "peer",
                Expr::select("peer", "Kind").equals(Expr::lit("gpu")),
            )],
        ),
    );
    let candidate = build(
        2,
        record_with(
            AttributeRecord::new(),
            vec![port("a"), port("b").with("Kind", Expr::lit("gpu"))],
        ),
    );
    let mut m = matcher(pool_of([candidate]));
    let root = m.root(root_rec.clone());
    assert!(!m.try_match(root, Direction::Advance));
    assert_eq!(m.stats().pruned_first_port, 1);
    assert!(m.pool().contains(2));

    let reordered = build(
        3,
        record_with(
            AttributeRecord::new(),
            vec![port("b").with("Kind", Expr::lit("gpu")), port("a")],
        ),
    );
    let filler = build(4, record_with(AttributeRecord::new(), vec![port("x")]));
    let mut m = matcher(pool_of([reordered, filler]));
    let root = m.root(root_rec);
    assert!(m.try_match(root, Direction::Advance));
    assert_eq!(m.gang(root).unwrap().keys(), vec![1, 3, 4]);
}

#[test]
fn negotiation_consumes_gangs_and_reports_leftovers() {
    let pool = pool_of([
        reciprocal(1, "match"),
        reciprocal(2, "match"),
        reciprocal(3, "nomatch"),
    ]);
    let outcome = negotiate(pool, MatchConfig::default());
    assert_eq!(outcome.gangs.len(), 1);
    assert_eq!(outcome.gangs[0].keys(), vec![1, 2]);
    assert_eq!(outcome.unmatched, vec![3]);
    assert_eq!(outcome.stats.consumed, 2);
}

#[test]
fn retreat_floats_the_reciprocal_link_off_dock_zero() {
    let mut m = matcher(pool_of([relay(2), disk(3)]));
    let root = m.root(job(1));
    assert!(m.try_match(root, Direction::Advance));
    let first = m.gang(root).unwrap();
    assert_eq!(first.keys(), vec![1, 2, 3]);
    assert_eq!(root_peer_label(&first), "p");

    // The disk has no alternative, so the relay gives up its link on `p`,
    // takes the disk there, and links back to the job through `q`.
    assert!(m.try_match(root, Direction::Retreat));
    let second = m.gang(root).unwrap();
    assert_eq!(second.keys(), vec![1, 2, 3]);
    assert_eq!(root_peer_label(&second), "q");
    let relay_member = second.root.ports[0].member.as_ref().unwrap();
    assert_eq!(relay_member.ports[0].peer.as_ref().unwrap().key, 3);
    assert!(relay_member.ports[1].member.is_none());
    assert!(m.pool().is_empty());

    let dock = m.node(root).unwrap().dock(0).unwrap().clone();
    let child = dock.bound_child().unwrap();
    assert_eq!(m.node(child).unwrap().self_linked_dock(), Some(1));
    assert_eq!(dock.linked_dock_index(), Some(1));
    assert!(m.two_party_test(child, 1).is_true());
}

#[test]
fn retreat_enumerates_alternatives_then_restores_the_pool() {
    let mut m = matcher(pool_of([relay(2), disk(3)]));
    let root = m.root(job(1));
    assert!(m.try_match(root, Direction::Advance));
    let mut labels = vec![root_peer_label(&m.gang(root).unwrap())];
    let mut exhausted = false;
    for _ in 0..16 {
        if !m.try_match(root, Direction::Retreat) {
            exhausted = true;
            break;
        }
        let gang = m.gang(root).unwrap();
        assert_eq!(gang.keys(), vec![1, 2, 3]);
        assert!(m.pool().is_empty());
        labels.push(root_peer_label(&gang));
    }
    assert!(exhausted);
    assert_eq!(labels[0], "p");
    assert!(labels[1..].iter().all(|l| l == "q"));
    assert_eq!(pool_keys(&m), vec![2, 3]);
    assert_eq!(m.arena().len(), 1);
}

#[test]
fn retreat_walks_later_docks_before_earlier_ones() {
    let mut m = matcher(pool_of([
        machine(2, Some("m1")),
        license(3, "m1"),
        license(4, "m1"),
    ]));
    let root = m.root(licensed_job(1));
    assert!(m.try_match(root, Direction::Advance));
    assert_eq!(m.gang(root).unwrap().keys(), vec![1, 2, 3]);
    assert!(m.try_match(root, Direction::Retreat));
    assert_eq!(m.gang(root).unwrap().keys(), vec![1, 2, 4]);
    assert_eq!(pool_keys(&m), vec![3]);
    assert!(!m.try_match(root, Direction::Retreat));
    assert_eq!(pool_keys(&m), vec![2, 3, 4]);
}

#[test]
fn rebinding_a_claimed_root_returns_its_record() {
    let mut m = matcher(pool_of([reciprocal(1, "match"), reciprocal(2, "match")]));
    let root = m.claim_root(1).unwrap();
    assert!(m.try_match(root, Direction::Advance));
    assert!(m.pool().is_empty());

    // Children cannot be rebound.
    let child = m.node(root).unwrap().dock(0).unwrap().bound_child().unwrap();
    assert!(!m.bind(child, Arc::new(reciprocal(8, "match"))));
    assert!(m.pool().is_empty());

    assert!(m.bind(root, Arc::new(reciprocal(9, "match"))));
    assert_eq!(pool_keys(&m), vec![1, 2]);
    assert_eq!(m.node(root).unwrap().bound_resource(), Some(9));
    assert!(m.release(root));
    assert_eq!(pool_keys(&m), vec![1, 2]);
    assert!(m.arena().is_empty());
}

#[test]
fn releasing_an_unclaimed_root_leaves_the_pool_alone() {
    let mut m = matcher(pool_of([reciprocal(2, "nomatch")]));
    let root = m.root(reciprocal(1, "match"));
    assert!(!m.try_match(root, Direction::Advance));
    assert!(m.release(root));
    assert_eq!(pool_keys(&m), vec![2]);
}
