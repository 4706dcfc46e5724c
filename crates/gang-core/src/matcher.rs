// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Backtracking gang matcher over an owned offer pool.
//!
//! Every record taken out of the pool during a search goes through
//! [`GangMatcher::try_with_reservation`] and comes back through
//! `release_child`, so a failed search always leaves the pool exactly as it
//! found it.
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::MatchConfig;
use crate::ident::NodeId;
use crate::node::{Dock, MatchNode, NodeArena};
use crate::pool::OfferPool;
use crate::record::ResourceRecord;
use crate::telemetry::{self, SearchStats};
use crate::value::Value;

/// Which way the dock cursor is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Fill docks left to right.
    Advance,
    /// Look for an alternative binding, right to left.
    Retreat,
}

/// A matched gang, read out of the match tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gang {
    /// The root member.
    pub root: GangMember,
}

impl Gang {
    /// Keys of every member, root first, depth first.
    pub fn keys(&self) -> Vec<i64> {
        let mut out = Vec::new();
        self.root.collect_keys(&mut out);
        out
    }
}

/// One record bound into a gang.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GangMember {
    /// Record key.
    pub key: i64,
    /// One binding per port, in port order.
    pub ports: Vec<PortBinding>,
}

impl GangMember {
    fn collect_keys(&self, out: &mut Vec<i64>) {
        out.push(self.key);
        for member in self.ports.iter().filter_map(|p| p.member.as_ref()) {
            member.collect_keys(out);
        }
    }
}

/// What a port is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    /// Port label.
    pub label: String,
    /// The port on the other side of the connection.
    pub peer: Option<PeerRef>,
    /// The member bound below this port; `None` for the link to the parent.
    pub member: Option<GangMember>,
}

/// A port of another gang member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRef {
    /// Record key.
    pub key: i64,
    /// Port label.
    pub label: String,
}

/// Owns a node arena and an offer pool and searches for gangs.
#[derive(Debug)]
pub struct GangMatcher {
    arena: NodeArena,
    pool: OfferPool,
    /// Roots whose record was taken from `pool`.
    claimed: FxHashSet<NodeId>,
    config: MatchConfig,
    stats: SearchStats,
}

impl GangMatcher {
    /// Creates a matcher over `pool`.
    pub fn new(pool: OfferPool, config: MatchConfig) -> Self {
        Self {
            arena: NodeArena::new(config.max_eval_depth),
            pool,
            claimed: FxHashSet::default(),
            config,
            stats: SearchStats::default(),
        }
    }

    /// The offer pool in its current state.
    pub fn pool(&self) -> &OfferPool {
        &self.pool
    }

    /// Consumes the matcher, returning its pool.
    pub fn into_pool(self) -> OfferPool {
        self.pool
    }

    /// Counters accumulated since construction.
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Active configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// The node arena.
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Live node behind `id`.
    pub fn node(&self, id: NodeId) -> Option<&MatchNode> {
        self.arena.node(id)
    }

    /// Creates a search root bound to `record`, which is not taken from the pool.
    pub fn root(&mut self, record: ResourceRecord) -> NodeId {
        let id = self.arena.spawn();
        self.arena.bind(id, Arc::new(record));
        id
    }

    /// Claims the pool entry `key` as a search root. [`release`](Self::release)
    /// puts it back.
    pub fn claim_root(&mut self, key: i64) -> Option<NodeId> {
        let record = self.pool.remove(key)?;
        self.stats.reservations += 1;
        let id = self.arena.spawn();
        self.arena.bind(id, record);
        self.claimed.insert(id);
        Some(id)
    }

    /// Rebinds the root `node` to `record`, releasing anything bound below it
    /// first.
    ///
    /// A record the root had claimed from the pool goes back to the pool;
    /// `record` itself is never pool-owned. Returns `false` for a stale id
    /// or a node that has a parent.
    pub fn bind(&mut self, node: NodeId, record: Arc<ResourceRecord>) -> bool {
        if !self.arena.node(node).is_some_and(MatchNode::is_root) {
            return false;
        }
        self.retire(node, false);
        self.return_root_record(node);
        self.arena.bind(node, record)
    }

    /// See [`NodeArena::two_party_test`].
    pub fn two_party_test(&self, node: NodeId, dock: usize) -> Value {
        self.arena.two_party_test(node, dock)
    }

    /// Runs the dock search on `node`. Returns `false` when no consistent
    /// assignment exists for the current pool; the pool is then unchanged.
    pub fn try_match(&mut self, node: NodeId, direction: Direction) -> bool {
        let before = self.stats;
        let matched = self.search(node, direction);
        if self.arena.node(node).is_some_and(MatchNode::is_root) {
            let root_key = self.arena.node(node).and_then(MatchNode::bound_resource);
            telemetry::match_finished(root_key, matched, &self.stats.since(&before));
        }
        matched
    }

    /// Releases every record bound below `node` and clears its docks.
    ///
    /// With `finish`, records below `node` are consumed instead of returned
    /// to the pool; their keys are returned.
    pub fn retire(&mut self, node: NodeId, finish: bool) -> Vec<i64> {
        let mut consumed = Vec::new();
        self.retire_into(node, finish, &mut consumed);
        consumed
    }

    /// Consumes the gang rooted at `root` and frees its nodes.
    ///
    /// Returns the consumed keys, root first; empty when `root` is not a live
    /// root.
    pub fn finish(&mut self, root: NodeId) -> Vec<i64> {
        if !self.arena.node(root).is_some_and(MatchNode::is_root) {
            return Vec::new();
        }
        let mut consumed = self.retire(root, true);
        if let Some(record) = self.arena.unbind(root) {
            consumed.insert(0, record.key());
            self.stats.consumed += 1;
        }
        self.claimed.remove(&root);
        self.arena.free(root);
        debug!(keys = ?consumed, "gang consumed");
        consumed
    }

    /// Undoes every binding under `root` and frees it. A root made with
    /// [`claim_root`](Self::claim_root) returns its record to the pool.
    /// Returns `false` when `root` is not a live root.
    pub fn release(&mut self, root: NodeId) -> bool {
        if !self.arena.node(root).is_some_and(MatchNode::is_root) {
            return false;
        }
        self.retire(root, false);
        self.return_root_record(root);
        self.arena.free(root);
        true
    }

    fn return_root_record(&mut self, root: NodeId) {
        let Some(record) = self.arena.unbind(root) else {
            return;
        };
        if self.claimed.remove(&root) {
            self.pool.reinsert(record.key(), record);
            self.stats.releases += 1;
        }
    }

    /// Reads the binding tree under `root`.
    pub fn gang(&self, root: NodeId) -> Option<Gang> {
        Some(Gang {
            root: self.member(root)?,
        })
    }

    /// Claims pool entry `key`, hands it to `attempt`, and puts it back when
    /// `attempt` declines it. A missing key declines without calling `attempt`.
    pub fn try_with_reservation<F>(&mut self, key: i64, attempt: F) -> bool
    where
        F: FnOnce(&mut Self, Arc<ResourceRecord>) -> bool,
    {
        let Some(record) = self.pool.remove(key) else {
            return false;
        };
        self.stats.reservations += 1;
        if attempt(self, Arc::clone(&record)) {
            return true;
        }
        self.pool.reinsert(key, record);
        self.stats.releases += 1;
        false
    }

    fn search(&mut self, node: NodeId, direction: Direction) -> bool {
        let Some(n) = self.arena.node(node) else {
            return false;
        };
        let len = n.docks.len() as isize;
        let is_root = n.is_root();
        let mut direction = direction;
        let mut i: isize = match direction {
            Direction::Advance => 0,
            Direction::Retreat => len - 1,
        };

        loop {
            self.stats.steps += 1;
            if direction == Direction::Advance && i >= len {
                let linked = self
                    .arena
                    .node(node)
                    .is_some_and(|n| n.self_linked_dock.is_some());
                if linked || is_root {
                    return true;
                }
                self.retire(node, false);
                return false;
            }
            if direction == Direction::Retreat && i < 0 {
                self.retire(node, false);
                return false;
            }

            let idx = i as usize;
            let Some(n) = self.arena.node(node) else {
                return false;
            };
            let self_link = n.self_linked_dock;
            let satisfied = n.docks.get(idx).is_some_and(|d| d.satisfied);

            if self_link == Some(idx) {
                match direction {
                    Direction::Advance if satisfied => i += 1,
                    Direction::Advance => {
                        if self.arena.two_party_test(node, idx).is_true() {
                            self.arena.set_satisfied(node, idx, true);
                            i += 1;
                        } else {
                            self.arena.set_self_link(node, None);
                        }
                    }
                    Direction::Retreat if idx == 0 => {
                        if len == 1 {
                            self.retire(node, false);
                            return false;
                        }
                        trace!(%node, "floating reciprocal link off dock 0");
                        self.arena.set_self_link(node, None);
                        if let Some(d) = self.arena.dock_mut(node, 0) {
                            d.clear_binding();
                        }
                        if self.fill_dock(node, 0, false) {
                            self.reset_cursors_after(node, 0);
                            direction = Direction::Advance;
                            i += 1;
                        } else {
                            self.retire(node, false);
                            return false;
                        }
                    }
                    Direction::Retreat => {
                        self.arena.set_satisfied(node, idx, false);
                        i -= 1;
                    }
                }
                continue;
            }

            match direction {
                Direction::Advance if !satisfied => {
                    if self_link.is_none()
                        && !is_root
                        && self.arena.two_party_test(node, idx).is_true()
                    {
                        self.arena.set_self_link(node, Some(idx));
                        self.arena.set_satisfied(node, idx, true);
                        i += 1;
                    } else if self.fill_dock(node, idx, false) {
                        i += 1;
                    } else {
                        direction = Direction::Retreat;
                        i -= 1;
                    }
                }
                Direction::Advance => i += 1,
                Direction::Retreat if satisfied => {
                    if self.fill_dock(node, idx, true) {
                        self.reset_cursors_after(node, idx);
                        direction = Direction::Advance;
                        i += 1;
                    } else {
                        i -= 1;
                    }
                }
                Direction::Retreat => i -= 1,
            }
        }
    }

    /// Finds a binding for dock `i` of `node`, resuming where the dock left off.
    fn fill_dock(&mut self, node: NodeId, i: usize, retreating: bool) -> bool {
        let Some(dock) = self.arena.dock(node, i).cloned() else {
            return false;
        };

        if let Some(child) = dock.bound_child {
            if retreating {
                if self.search(child, Direction::Retreat) {
                    let linked = self.arena.node(child).and_then(MatchNode::self_linked_dock);
                    if let Some(d) = self.arena.dock_mut(node, i) {
                        d.linked_dock_index = linked;
                        d.satisfied = true;
                    }
                    return true;
                }
                self.arena.unlink(node, i);
            }
            if self.scan_ports(node, i, child, dock.next_port) {
                return true;
            }
            self.release_child(node, i);
        }

        let mut after = dock.resume_key;
        while let Some(key) = self.pool.first_after(after).map(|(k, _)| k) {
            after = Some(key);
            if let Some(d) = self.arena.dock_mut(node, i) {
                d.resume_key = Some(key);
            }
            self.stats.candidates += 1;
            trace!(%node, dock = i, candidate = key, "trying candidate");
            let accepted = self.try_with_reservation(key, |m, record| {
                let child = m.arena.spawn();
                m.arena.bind(child, record);
                if m.scan_ports(node, i, child, 0) {
                    return true;
                }
                m.arena.unbind(child);
                m.arena.free(child);
                if let Some(d) = m.arena.dock_mut(node, i) {
                    d.clear_binding();
                }
                false
            });
            if accepted {
                return true;
            }
        }

        if let Some(d) = self.arena.dock_mut(node, i) {
            d.clear_binding();
        }
        false
    }

    /// Tries `child`'s ports from `start` against dock `i` of `node`.
    fn scan_ports(&mut self, node: NodeId, i: usize, child: NodeId, start: usize) -> bool {
        let port_count = self.arena.record(child).map_or(0, |r| r.ports().len());
        for j in start..port_count {
            self.arena.link(node, i, child, j);
            if let Some(d) = self.arena.dock_mut(node, i) {
                d.next_port = j + 1;
            }
            let verdict = self.arena.two_party_test(child, j);
            trace!(%node, dock = i, %child, port = j, %verdict, "two-party test");
            if verdict.is_undefined() && j == 0 {
                // A first port is never accepted on absence of information.
                self.stats.pruned_first_port += 1;
                self.arena.unlink(node, i);
                return false;
            }
            if !(verdict.is_true() || verdict.is_undefined()) {
                self.arena.unlink(node, i);
                continue;
            }
            if self.search(child, Direction::Advance) {
                let linked = self.arena.node(child).and_then(MatchNode::self_linked_dock);
                if let Some(d) = self.arena.dock_mut(node, i) {
                    d.linked_dock_index = linked;
                    d.satisfied = true;
                }
                return true;
            }
            self.arena.unlink(node, i);
        }
        false
    }

    /// Retires the child held by dock `i` and returns its record to the pool.
    fn release_child(&mut self, node: NodeId, i: usize) {
        let Some(child) = self.arena.dock(node, i).and_then(|d| d.bound_child) else {
            return;
        };
        self.retire(child, false);
        if let Some(record) = self.arena.unbind(child) {
            self.pool.reinsert(record.key(), record);
            self.stats.releases += 1;
        }
        self.arena.free(child);
        if let Some(d) = self.arena.dock_mut(node, i) {
            d.clear_binding();
        }
    }

    fn retire_into(&mut self, node: NodeId, finish: bool, consumed: &mut Vec<i64>) {
        let Some(n) = self.arena.node(node) else {
            return;
        };
        let held: Vec<(usize, NodeId)> = n
            .docks
            .iter()
            .enumerate()
            .filter_map(|(k, d)| d.bound_child.map(|c| (k, c)))
            .collect();
        // Most recently bound first.
        for (k, child) in held.into_iter().rev() {
            if finish {
                self.retire_into(child, true, consumed);
                if let Some(record) = self.arena.unbind(child) {
                    consumed.push(record.key());
                    self.stats.consumed += 1;
                }
                self.arena.free(child);
                if let Some(d) = self.arena.dock_mut(node, k) {
                    d.clear_binding();
                }
            } else {
                self.release_child(node, k);
            }
        }
        if let Some(n) = self.arena.node_mut(node) {
            n.docks.iter_mut().for_each(Dock::reset);
        }
        self.arena.set_self_link(node, None);
    }

    fn reset_cursors_after(&mut self, node: NodeId, i: usize) {
        if let Some(n) = self.arena.node_mut(node) {
            for d in n.docks.iter_mut().skip(i + 1) {
                d.resume_key = None;
                d.next_port = 0;
            }
        }
    }

    fn member(&self, node: NodeId) -> Option<GangMember> {
        let n = self.arena.node(node)?;
        let record = self.arena.record(node)?;
        let mut ports = Vec::with_capacity(n.docks.len());
        for (k, dock) in n.docks.iter().enumerate() {
            let label = record.port(k).map(|p| p.label().to_owned())?;
            let binding = match (n.self_linked_dock == Some(k), n.parent) {
                (true, Some((p, pd))) => PortBinding {
                    label,
                    peer: self.peer_ref(p, pd),
                    member: None,
                },
                _ => match (dock.bound_child, dock.linked_dock_index) {
                    (Some(child), Some(cp)) => PortBinding {
                        label,
                        peer: self.peer_ref(child, cp),
                        member: self.member(child),
                    },
                    _ => PortBinding {
                        label,
                        peer: None,
                        member: None,
                    },
                },
            };
            ports.push(binding);
        }
        Some(GangMember {
            key: record.key(),
            ports,
        })
    }

    fn peer_ref(&self, node: NodeId, port: usize) -> Option<PeerRef> {
        let record = self.arena.record(node)?;
        Some(PeerRef {
            key: record.key(),
            label: record.port(port)?.label().to_owned(),
        })
    }
}
