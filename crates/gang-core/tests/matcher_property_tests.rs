// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]
mod common;

use std::collections::BTreeSet;

use common::{license, licensed_job, machine, pool_of, reciprocal};
use gang_core::{Direction, GangMatcher, MatchConfig, OfferPool, ResourceRecord};
use proptest::prelude::*;

const NAMES: [&str; 3] = ["m0", "m1", "m2"];

fn reciprocal_pool(kinds: &[bool]) -> OfferPool {
    pool_of(kinds.iter().enumerate().map(|(i, &matching)| {
        reciprocal(i as i64 + 2, if matching { "match" } else { "nomatch" })
    }))
}

fn licensing_pool(machines: &[Option<usize>], licenses: &[usize]) -> OfferPool {
    let machines = machines
        .iter()
        .enumerate()
        .map(|(i, name)| machine(10 + i as i64, name.map(|n| NAMES[n])));
    let licenses = licenses
        .iter()
        .enumerate()
        .map(|(i, &host)| license(100 + i as i64, NAMES[host]));
    pool_of(machines.chain(licenses))
}

fn run(pool: OfferPool, root: ResourceRecord) -> (bool, Vec<i64>, GangMatcher) {
    let before: Vec<i64> = pool.keys().collect();
    let mut m = GangMatcher::new(pool, MatchConfig::default());
    let id = m.root(root);
    let matched = m.try_match(id, Direction::Advance);
    if matched {
        let gang = m.gang(id).unwrap();
        m.finish(id);
        return (true, gang.keys(), m);
    }
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), before);
    assert!(!m.try_match(id, Direction::Advance));
    assert_eq!(m.pool().keys().collect::<Vec<_>>(), before);
    (false, Vec::new(), m)
}

proptest! {
    #[test]
    fn reciprocal_success_is_predicted_by_the_pool(
        kinds in prop::collection::vec(any::<bool>(), 0..8)
    ) {
        let expected = kinds.iter().position(|&k| k).map(|i| i as i64 + 2);
        let (matched, keys, m) = run(reciprocal_pool(&kinds), reciprocal(1, "match"));
        prop_assert_eq!(matched, expected.is_some());
        if let Some(partner) = expected {
            prop_assert_eq!(keys, vec![1, partner]);
            prop_assert!(!m.pool().contains(partner));
            prop_assert_eq!(m.pool().len(), kinds.len() - 1);
        }
    }

    #[test]
    fn licensed_job_matches_iff_some_license_fits_some_machine(
        machines in prop::collection::vec(prop::option::of(0usize..3), 0..5),
        licenses in prop::collection::vec(0usize..3, 0..5),
    ) {
        let named: BTreeSet<usize> = machines.iter().flatten().copied().collect();
        let expected = licenses.iter().any(|host| named.contains(host));
        let total = machines.len() + licenses.len();
        let (matched, keys, m) = run(licensing_pool(&machines, &licenses), licensed_job(1));
        prop_assert_eq!(matched, expected);
        if matched {
            prop_assert_eq!(keys.len(), 3);
            prop_assert_eq!(m.pool().len(), total - 2);
            for key in &keys[1..] {
                prop_assert!(!m.pool().contains(*key));
            }
        } else {
            prop_assert_eq!(m.pool().len(), total);
        }
        prop_assert!(m.arena().is_empty() || !matched);
    }
}
