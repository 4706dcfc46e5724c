// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Search counters and their log summaries.
use serde::Serialize;
use tracing::debug;

/// Counters accumulated by a [`GangMatcher`](crate::GangMatcher).
///
/// The engine has no timeout of its own; callers that need one can watch
/// `steps` between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Iterations of the dock state machine.
    pub steps: u64,
    /// Pool entries considered as candidates.
    pub candidates: u64,
    /// Candidates dropped because their first port evaluated to `Undefined`.
    pub pruned_first_port: u64,
    /// Records claimed from the pool.
    pub reservations: u64,
    /// Records returned to the pool.
    pub releases: u64,
    /// Records permanently consumed by a finished gang.
    pub consumed: u64,
}

impl SearchStats {
    /// Counter deltas since `earlier`.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            steps: self.steps.saturating_sub(earlier.steps),
            candidates: self.candidates.saturating_sub(earlier.candidates),
            pruned_first_port: self
                .pruned_first_port
                .saturating_sub(earlier.pruned_first_port),
            reservations: self.reservations.saturating_sub(earlier.reservations),
            releases: self.releases.saturating_sub(earlier.releases),
            consumed: self.consumed.saturating_sub(earlier.consumed),
        }
    }
}

pub(crate) fn match_finished(root_key: Option<i64>, matched: bool, delta: &SearchStats) {
    debug!(
        root = ?root_key,
        matched,
        steps = delta.steps,
        candidates = delta.candidates,
        pruned_first_port = delta.pruned_first_port,
        reservations = delta.reservations,
        releases = delta.releases,
        "gang match finished"
    );
}

pub(crate) fn saturation_finished(passes: usize, edges: usize, converged: bool) {
    debug!(passes, edges, converged, "saturation finished");
}
