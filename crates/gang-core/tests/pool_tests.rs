// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]
mod common;

use common::{pool_of, reciprocal};
use gang_core::OfferPool;

#[test]
fn first_after_walks_keys_in_order() {
    let pool = pool_of([reciprocal(30, "match"), reciprocal(10, "match"), reciprocal(20, "match")]);
    let mut seen = Vec::new();
    let mut after = None;
    while let Some((key, record)) = pool.first_after(after) {
        assert_eq!(record.key(), key);
        seen.push(key);
        after = Some(key);
    }
    assert_eq!(seen, vec![10, 20, 30]);
    assert_eq!(pool.first_after(Some(15)).map(|(k, _)| k), Some(20));
    assert!(pool.first_after(Some(30)).is_none());
}

#[test]
fn remove_and_reinsert_restore_the_pool() {
    let mut pool = pool_of([reciprocal(1, "match"), reciprocal(2, "match")]);
    let claimed = pool.remove(1).unwrap();
    assert!(!pool.contains(1));
    assert_eq!(pool.first_after(None).map(|(k, _)| k), Some(2));
    pool.reinsert(1, claimed);
    assert_eq!(pool.keys().collect::<Vec<_>>(), vec![1, 2]);
    assert!(pool.remove(99).is_none());
}

#[test]
fn empty_pool_has_no_first_entry() {
    let pool = OfferPool::new();
    assert!(pool.is_empty());
    assert!(pool.first_after(None).is_none());
}
