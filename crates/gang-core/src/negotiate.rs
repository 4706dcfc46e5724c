// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One negotiation cycle: try every pool entry as a gang root.
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::matcher::{Direction, Gang, GangMatcher};
use crate::pool::OfferPool;
use crate::telemetry::SearchStats;

/// Result of [`negotiate`].
#[derive(Debug, Clone, Serialize)]
pub struct NegotiationOutcome {
    /// Gangs formed, in the order their roots were tried.
    pub gangs: Vec<Gang>,
    /// Keys still in the pool when the cycle ended.
    pub unmatched: Vec<i64>,
    /// Counters for the whole cycle.
    pub stats: SearchStats,
}

/// Walks `pool` in key order and matches each entry that is still present.
///
/// A successful root is read out and consumed together with its gang; a
/// failed root is returned to the pool and may still be bound into a later
/// gang.
pub fn negotiate(pool: OfferPool, config: MatchConfig) -> NegotiationOutcome {
    let keys: Vec<i64> = pool.keys().collect();
    let mut matcher = GangMatcher::new(pool, config);
    let mut gangs = Vec::new();
    for key in keys {
        let Some(root) = matcher.claim_root(key) else {
            continue;
        };
        if matcher.try_match(root, Direction::Advance) {
            if let Some(gang) = matcher.gang(root) {
                gangs.push(gang);
            }
            matcher.finish(root);
        } else {
            debug!(root = key, "no gang for root");
            matcher.release(root);
        }
    }
    let stats = *matcher.stats();
    let unmatched: Vec<i64> = matcher.pool().keys().collect();
    info!(
        gangs = gangs.len(),
        unmatched = unmatched.len(),
        steps = stats.steps,
        "negotiation cycle complete"
    );
    NegotiationOutcome {
        gangs,
        unmatched,
        stats,
    }
}
