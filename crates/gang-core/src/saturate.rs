// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saturation graph: static discovery of which ports can match.
//!
//! Every port of a batch becomes a [`PortNode`]. A port attribute whose value
//! comes from an earlier port (`cpu.Name`) depends on an
//! [`ExternalAttributeNode`] owned by that earlier port; its value is whatever
//! the port ends up connected to. Saturation repeatedly tests every ordered
//! pair of ports and records a [`MatchEdge`] when the source's requirements
//! can hold against the target. Requirements that need external attributes
//! are tested once per combination of [`MatchPath`]s, each path being a chain
//! of match edges that ends at a literal value.
use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::attrs::{decompose, split_reference, Clause};
use crate::config::MatchConfig;
use crate::ident::{EdgeId, ExtNodeId, NodeId, PortNodeId};
use crate::node::NodeArena;
use crate::record::ResourceRecord;
use crate::telemetry;
use crate::value::Value;

/// Value source of one non-requirements port attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrValueNode {
    name: String,
    literal: Option<Value>,
    dependency: Option<ExtNodeId>,
}

impl AttrValueNode {
    /// Attribute name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value when the attribute references nothing outside its port.
    pub fn literal(&self) -> Option<&Value> {
        self.literal.as_ref()
    }

    /// External attribute the value is read from.
    pub fn dependency(&self) -> Option<ExtNodeId> {
        self.dependency
    }
}

/// One requirements clause and the external attributes it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseNode {
    clause: Clause,
    dependencies: BTreeSet<ExtNodeId>,
}

impl ClauseNode {
    /// The clause.
    pub fn clause(&self) -> &Clause {
        &self.clause
    }

    /// External attribute nodes the clause reads.
    pub fn dependencies(&self) -> &BTreeSet<ExtNodeId> {
        &self.dependencies
    }
}

/// A port of some record in the batch.
#[derive(Debug, Clone)]
pub struct PortNode {
    record: usize,
    port: usize,
    attr_nodes: Vec<AttrValueNode>,
    clauses: Vec<ClauseNode>,
    edges: Vec<EdgeId>,
}

impl PortNode {
    /// Index of the owning record in the batch.
    pub fn record_index(&self) -> usize {
        self.record
    }

    /// Index of the port within its record.
    pub fn port_index(&self) -> usize {
        self.port
    }

    /// Attribute value nodes.
    pub fn attr_nodes(&self) -> &[AttrValueNode] {
        &self.attr_nodes
    }

    /// Attribute value node for `name` (ignoring case).
    pub fn attr(&self, name: &str) -> Option<&AttrValueNode> {
        self.attr_nodes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Requirements clauses.
    pub fn clauses(&self) -> &[ClauseNode] {
        &self.clauses
    }

    /// Outgoing match edges in insertion order.
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }
}

/// The value of `attr_name` as seen through whatever binds to `owning_port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAttributeNode {
    owning_port: PortNodeId,
    attr_name: String,
}

impl ExternalAttributeNode {
    /// Port whose peer supplies the value.
    pub fn owning_port(&self) -> PortNodeId {
        self.owning_port
    }

    /// Attribute read from the peer.
    pub fn attr_name(&self) -> &str {
        &self.attr_name
    }
}

/// `source`'s requirements can hold when `target` binds to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEdge {
    /// Edge id.
    pub id: EdgeId,
    /// Port whose requirements were tested.
    pub source: PortNodeId,
    /// Port bound to the source during the test.
    pub target: PortNodeId,
    /// One path per external dependency; empty for a direct match.
    pub annotations: Vec<MatchPath>,
}

/// A chain of match edges ending at a literal attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchPath {
    /// Edges from the dependency's owning port to the literal.
    pub edges: Vec<EdgeId>,
}

/// Summary of a [`PortGraph::saturate`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaturationReport {
    /// Passes over all port pairs.
    pub passes: usize,
    /// Edges added by this run.
    pub edges_added: usize,
    /// `false` when the pass limit stopped the run first.
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum CursorState {
    #[default]
    Idle,
    Running,
    Exhausted,
}

/// Suspended depth-first search over match edges, one per external node.
#[derive(Debug, Clone, Default)]
struct PathCursor {
    state: CursorState,
    visited: Vec<bool>,
    next_edge: Vec<usize>,
    stack: Vec<ExtNodeId>,
    path: Vec<EdgeId>,
}

/// Batch-scoped saturation graph.
#[derive(Debug)]
pub struct PortGraph {
    records: Vec<Arc<ResourceRecord>>,
    ports: Vec<PortNode>,
    ext_nodes: Vec<ExternalAttributeNode>,
    ext_index: FxHashMap<(PortNodeId, String), ExtNodeId>,
    cursors: Vec<PathCursor>,
    edges: Vec<MatchEdge>,
    config: MatchConfig,
}

impl PortGraph {
    /// Builds port, attribute and clause nodes for `records`. No edges exist
    /// until [`saturate`](Self::saturate) runs.
    pub fn initialize(records: &[ResourceRecord], config: MatchConfig) -> Self {
        let mut graph = Self {
            records: records.iter().cloned().map(Arc::new).collect(),
            ports: Vec::new(),
            ext_nodes: Vec::new(),
            ext_index: FxHashMap::default(),
            cursors: Vec::new(),
            edges: Vec::new(),
            config,
        };
        for ri in 0..graph.records.len() {
            let record = Arc::clone(&graph.records[ri]);
            let base = graph.ports.len();
            for pi in 0..record.ports().len() {
                graph.ports.push(PortNode {
                    record: ri,
                    port: pi,
                    attr_nodes: Vec::new(),
                    clauses: Vec::new(),
                    edges: Vec::new(),
                });
            }
            for (pi, port) in record.ports().iter().enumerate() {
                let Some(scope) = record.scope(pi) else {
                    continue;
                };
                let scope = scope.with_max_depth(graph.config.max_eval_depth);

                let mut attr_nodes = Vec::with_capacity(port.attributes().len());
                for (name, expr) in port.attributes().iter() {
                    let references = scope.external_references(expr, false);
                    let mut dependency = None;
                    for reference in &references {
                        let Some((label, attr)) = split_reference(reference) else {
                            continue;
                        };
                        if port.is_labelled(label) {
                            continue;
                        }
                        if let Some(owner) = record.port_index(label) {
                            dependency = Some(graph.intern_ext_node(PortNodeId(base + owner), attr));
                        }
                    }
                    let literal = scope.flatten(expr);
                    if literal.is_none() && dependency.is_none() {
                        warn!(
                            record = record.key(),
                            port = port.label(),
                            attr = name,
                            "attribute only reads its own peer; no path can end here"
                        );
                    }
                    attr_nodes.push(AttrValueNode {
                        name: name.to_owned(),
                        literal,
                        dependency,
                    });
                }

                let mut clauses = Vec::new();
                for clause in decompose(port.requirements(), &scope) {
                    let mut dependencies = BTreeSet::new();
                    for reference in &clause.references {
                        let Some((label, attr)) = split_reference(reference) else {
                            continue;
                        };
                        if port.is_labelled(label) {
                            continue;
                        }
                        if let Some(owner) = record.port_index(label) {
                            dependencies.insert(graph.intern_ext_node(PortNodeId(base + owner), attr));
                        }
                    }
                    clauses.push(ClauseNode {
                        clause,
                        dependencies,
                    });
                }

                let node = &mut graph.ports[base + pi];
                node.attr_nodes = attr_nodes;
                node.clauses = clauses;
            }
        }
        debug!(
            records = graph.records.len(),
            ports = graph.ports.len(),
            ext_nodes = graph.ext_nodes.len(),
            "port graph initialized"
        );
        graph
    }

    fn intern_ext_node(&mut self, owning_port: PortNodeId, attr: &str) -> ExtNodeId {
        let key = (owning_port, attr.to_ascii_lowercase());
        if let Some(id) = self.ext_index.get(&key) {
            return *id;
        }
        let id = ExtNodeId(self.ext_nodes.len());
        self.ext_nodes.push(ExternalAttributeNode {
            owning_port,
            attr_name: attr.to_owned(),
        });
        self.cursors.push(PathCursor::default());
        self.ext_index.insert(key, id);
        id
    }

    /// Adds match edges until a pass adds none, or until the configured pass
    /// limit is reached.
    pub fn saturate(&mut self) -> SaturationReport {
        let mut passes = 0;
        let mut edges_added = 0;
        let converged = loop {
            if let Some(limit) = self.config.max_saturation_passes {
                if passes >= limit {
                    warn!(passes, edges = self.edges.len(), "saturation pass limit reached");
                    break false;
                }
            }
            passes += 1;
            let mut added = 0;
            for p in 0..self.ports.len() {
                for q in 0..self.ports.len() {
                    added += self.add_match_edges(PortNodeId(p), PortNodeId(q));
                }
            }
            debug!(pass = passes, added, "saturation pass");
            edges_added += added;
            if added == 0 {
                break true;
            }
        };
        telemetry::saturation_finished(passes, self.edges.len(), converged);
        SaturationReport {
            passes,
            edges_added,
            converged,
        }
    }

    /// Tests `p` against `q` clause by clause; returns the number of edges added.
    fn add_match_edges(&mut self, p: PortNodeId, q: PortNodeId) -> usize {
        let target_deps: BTreeSet<ExtNodeId> = self.ports[q.0]
            .attr_nodes
            .iter()
            .filter_map(|a| a.dependency)
            .collect();
        let mut accepted: Vec<Vec<MatchPath>> = Vec::new();
        for ci in 0..self.ports[p.0].clauses.len() {
            let mut deps = self.ports[p.0].clauses[ci].dependencies.clone();
            deps.extend(target_deps.iter().copied());
            if deps.is_empty() {
                if self.eval_reqs(p, q, &[]) {
                    accepted.push(Vec::new());
                }
                continue;
            }

            let deps: Vec<ExtNodeId> = deps.into_iter().collect();
            let mut paths = Vec::with_capacity(deps.len());
            for &dep in &deps {
                match self.first_path(dep) {
                    Some(path) => paths.push(path),
                    None => break,
                }
            }
            if paths.len() < deps.len() {
                trace!(?p, ?q, clause = ci, "dependency without a path");
                continue;
            }
            loop {
                if self.eval_reqs(p, q, &paths) {
                    accepted.push(paths.clone());
                }
                if !self.advance_odometer(&deps, &mut paths) {
                    break;
                }
            }
        }

        let mut added = 0;
        for annotations in accepted {
            if self.add_edge(p, q, annotations) {
                added += 1;
            }
        }
        added
    }

    /// Moves to the next combination of paths; `false` once every
    /// combination has been produced.
    fn advance_odometer(&mut self, deps: &[ExtNodeId], paths: &mut [MatchPath]) -> bool {
        let mut k = deps.len();
        while k > 0 {
            k -= 1;
            if let Some(next) = self.next_path(deps[k]) {
                paths[k] = next;
                return true;
            }
            if k == 0 {
                return false;
            }
            match self.first_path(deps[k]) {
                Some(first) => paths[k] = first,
                None => return false,
            }
        }
        false
    }

    /// Builds a throwaway match tree for `p` bound to `q` plus one node per
    /// path edge, then evaluates `p`'s requirements one way.
    fn eval_reqs(&self, p: PortNodeId, q: PortNodeId, paths: &[MatchPath]) -> bool {
        let pn = &self.ports[p.0];
        let qn = &self.ports[q.0];
        let mut arena = NodeArena::new(self.config.max_eval_depth);
        let root = arena.spawn();
        arena.bind(root, Arc::clone(&self.records[pn.record]));
        let peer = arena.spawn();
        arena.bind(peer, Arc::clone(&self.records[qn.record]));
        arena.link(root, pn.port, peer, qn.port);

        let mut placed: FxHashMap<NodeId, PortNodeId> = FxHashMap::default();
        placed.insert(root, p);
        placed.insert(peer, q);
        for path in paths {
            let mut host = None;
            for &eid in &path.edges {
                let edge = &self.edges[eid.0];
                let source = &self.ports[edge.source.0];
                let target = &self.ports[edge.target.0];
                let parent = match host {
                    Some(node) => node,
                    None if source.record == pn.record => root,
                    None if source.record == qn.record => peer,
                    None => return false,
                };
                let child = match arena.dock(parent, source.port).and_then(|d| d.bound_child) {
                    Some(existing) if placed.get(&existing) == Some(&edge.target) => existing,
                    // Two paths disagree on what binds to this port.
                    Some(_) => return false,
                    None => {
                        let child = arena.spawn();
                        arena.bind(child, Arc::clone(&self.records[target.record]));
                        arena.link(parent, source.port, child, target.port);
                        placed.insert(child, edge.target);
                        child
                    }
                };
                host = Some(child);
            }
        }
        arena.two_party_test(root, pn.port).is_true()
    }

    /// Appends an edge unless an equivalent one already exists.
    fn add_edge(&mut self, source: PortNodeId, target: PortNodeId, annotations: Vec<MatchPath>) -> bool {
        let duplicate = self.ports[source.0].edges.iter().any(|eid| {
            let edge = &self.edges[eid.0];
            edge.target == target && (edge.annotations.is_empty() || edge.annotations == annotations)
        });
        if duplicate {
            return false;
        }
        let id = EdgeId(self.edges.len());
        trace!(%id, ?source, ?target, annotated = !annotations.is_empty(), "match edge");
        self.edges.push(MatchEdge {
            id,
            source,
            target,
            annotations,
        });
        self.ports[source.0].edges.push(id);
        true
    }

    /// Restarts the path search of `ext` and returns its first path.
    pub fn first_path(&mut self, ext: ExtNodeId) -> Option<MatchPath> {
        let count = self.ext_nodes.len();
        let cursor = self.cursors.get_mut(ext.0)?;
        cursor.visited = vec![false; count];
        cursor.next_edge = vec![0; count];
        cursor.visited[ext.0] = true;
        cursor.stack = vec![ext];
        cursor.path.clear();
        cursor.state = CursorState::Running;
        self.next_path(ext)
    }

    /// Resumes the path search of `ext`.
    ///
    /// Starts it when it has never run. Once exhausted, keeps returning
    /// `None` until [`first_path`](Self::first_path) is called.
    pub fn next_path(&mut self, ext: ExtNodeId) -> Option<MatchPath> {
        match self.cursors.get(ext.0)?.state {
            CursorState::Idle => return self.first_path(ext),
            CursorState::Exhausted => return None,
            CursorState::Running => {}
        }
        let Self {
            ports,
            ext_nodes,
            cursors,
            edges,
            ..
        } = self;
        let cursor = &mut cursors[ext.0];
        loop {
            let Some(&current) = cursor.stack.last() else {
                cursor.state = CursorState::Exhausted;
                return None;
            };
            let node = &ext_nodes[current.0];
            let outgoing = &ports[node.owning_port.0].edges;
            let at = cursor.next_edge[current.0];

            if at >= outgoing.len() {
                if cursor.path.is_empty() {
                    cursor.state = CursorState::Exhausted;
                    return None;
                }
                cursor.next_edge[current.0] = 0;
                cursor.visited[current.0] = false;
                cursor.path.pop();
                cursor.stack.pop();
                match cursor.stack.last() {
                    Some(&previous) => cursor.next_edge[previous.0] += 1,
                    None => {
                        cursor.state = CursorState::Exhausted;
                        return None;
                    }
                }
                continue;
            }

            let eid = outgoing[at];
            let target = &ports[edges[eid.0].target.0];
            let Some(attr) = target.attr(&node.attr_name) else {
                cursor.next_edge[current.0] += 1;
                continue;
            };
            match (attr.dependency, attr.literal.is_some()) {
                (Some(next), _) if cursor.visited[next.0] => {
                    cursor.next_edge[current.0] += 1;
                }
                (Some(next), _) => {
                    cursor.path.push(eid);
                    cursor.stack.push(next);
                    cursor.visited[next.0] = true;
                }
                (None, true) => {
                    cursor.path.push(eid);
                    cursor.next_edge[current.0] += 1;
                    let found = MatchPath {
                        edges: cursor.path.clone(),
                    };
                    cursor.path.pop();
                    return Some(found);
                }
                (None, false) => {
                    cursor.next_edge[current.0] += 1;
                }
            }
        }
    }

    /// External attribute nodes visited by `path` when started from `ext`,
    /// in order.
    pub fn path_nodes(&self, ext: ExtNodeId, path: &MatchPath) -> Vec<ExtNodeId> {
        let mut nodes = vec![ext];
        let mut current = ext;
        let hops = path.edges.len().saturating_sub(1);
        for eid in path.edges.iter().take(hops) {
            let Some(edge) = self.edges.get(eid.0) else {
                break;
            };
            let Some(name) = self.ext_nodes.get(current.0).map(|n| n.attr_name.as_str()) else {
                break;
            };
            let Some(next) = self.ports[edge.target.0]
                .attr(name)
                .and_then(AttrValueNode::dependency)
            else {
                break;
            };
            nodes.push(next);
            current = next;
        }
        nodes
    }

    /// Number of port nodes.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Port node `id`.
    pub fn port(&self, id: PortNodeId) -> Option<&PortNode> {
        self.ports.get(id.0)
    }

    /// Port node for the port labelled `label` of the record keyed `key`.
    pub fn find_port(&self, key: i64, label: &str) -> Option<PortNodeId> {
        self.ports
            .iter()
            .position(|node| {
                let record = &self.records[node.record];
                record.key() == key
                    && record
                        .port(node.port)
                        .is_some_and(|port| port.is_labelled(label))
            })
            .map(PortNodeId)
    }

    /// Record key and port label of `id`.
    pub fn describe_port(&self, id: PortNodeId) -> Option<(i64, &str)> {
        let node = self.ports.get(id.0)?;
        let record = self.records.get(node.record)?;
        Some((record.key(), record.port(node.port)?.label()))
    }

    /// All match edges in insertion order.
    pub fn edges(&self) -> &[MatchEdge] {
        &self.edges
    }

    /// Outgoing edges of `port`.
    pub fn edges_from(&self, port: PortNodeId) -> impl Iterator<Item = &MatchEdge> + '_ {
        self.ports
            .get(port.0)
            .map(|node| node.edges.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|eid| self.edges.get(eid.0))
    }

    /// Number of external attribute nodes.
    pub fn ext_node_count(&self) -> usize {
        self.ext_nodes.len()
    }

    /// External attribute node `id`.
    pub fn ext_node(&self, id: ExtNodeId) -> Option<&ExternalAttributeNode> {
        self.ext_nodes.get(id.0)
    }

    /// External attribute node for `attr` read through `port`.
    pub fn find_ext_node(&self, port: PortNodeId, attr: &str) -> Option<ExtNodeId> {
        self.ext_index
            .get(&(port, attr.to_ascii_lowercase()))
            .copied()
    }
}
