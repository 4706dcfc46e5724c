// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Match-tree nodes, their docks, and the arena that owns them.
//!
//! Parent and child links are [`NodeId`] lookups into a [`NodeArena`]; the
//! arena also owns the [`ScopeTable`] that lets an expression evaluated at one
//! node read attributes of the node bound across a port.
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::attrs::DEFAULT_MAX_EVAL_DEPTH;
use crate::expr::{AttrRef, Expr, Resolve};
use crate::ident::NodeId;
use crate::record::ResourceRecord;
use crate::value::{logical_and, Value};

/// Search state for one port of the record bound to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dock {
    pub(crate) port: usize,
    pub(crate) bound_child: Option<NodeId>,
    pub(crate) resume_key: Option<i64>,
    pub(crate) linked_dock_index: Option<usize>,
    pub(crate) satisfied: bool,
    pub(crate) next_port: usize,
}

impl Dock {
    fn new(port: usize) -> Self {
        Self {
            port,
            bound_child: None,
            resume_key: None,
            linked_dock_index: None,
            satisfied: false,
            next_port: 0,
        }
    }

    /// Index of the port this dock serves.
    pub fn port(&self) -> usize {
        self.port
    }

    /// Child node currently held by this dock.
    pub fn bound_child(&self) -> Option<NodeId> {
        self.bound_child
    }

    /// Last pool key tried at this dock.
    pub fn resume_key(&self) -> Option<i64> {
        self.resume_key
    }

    /// Port of the bound child that links back to this dock.
    pub fn linked_dock_index(&self) -> Option<usize> {
        self.linked_dock_index
    }

    /// Whether the dock's requirement currently holds.
    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// Drops the binding but keeps the pool cursor.
    pub(crate) fn clear_binding(&mut self) {
        self.bound_child = None;
        self.linked_dock_index = None;
        self.satisfied = false;
        self.next_port = 0;
    }

    /// Returns the dock to its freshly bound state.
    pub(crate) fn reset(&mut self) {
        self.clear_binding();
        self.resume_key = None;
    }
}

/// A node of the match tree.
#[derive(Debug, Clone, Default)]
pub struct MatchNode {
    pub(crate) bound_resource: Option<i64>,
    pub(crate) docks: Vec<Dock>,
    pub(crate) parent: Option<(NodeId, usize)>,
    pub(crate) self_linked_dock: Option<usize>,
    pub(crate) scope_id: u64,
}

impl MatchNode {
    /// Key of the bound record.
    pub fn bound_resource(&self) -> Option<i64> {
        self.bound_resource
    }

    /// One dock per port of the bound record.
    pub fn docks(&self) -> &[Dock] {
        &self.docks
    }

    /// Dock at `index`.
    pub fn dock(&self, index: usize) -> Option<&Dock> {
        self.docks.get(index)
    }

    /// Parent node and the parent's dock this node fills.
    pub fn parent(&self) -> Option<(NodeId, usize)> {
        self.parent
    }

    /// The reciprocal dock linking back to the parent.
    pub fn self_linked_dock(&self) -> Option<usize> {
        self.self_linked_dock
    }

    /// Scope generation assigned at the last bind.
    pub fn scope_id(&self) -> u64 {
        self.scope_id
    }

    /// Returns `true` when the node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Bound records by node; written on bind, removed on unbind.
#[derive(Debug, Default)]
pub struct ScopeTable {
    scopes: FxHashMap<NodeId, Arc<ResourceRecord>>,
}

impl ScopeTable {
    /// Record bound to `node`.
    pub fn get(&self, node: NodeId) -> Option<&Arc<ResourceRecord>> {
        self.scopes.get(&node)
    }

    fn insert(&mut self, node: NodeId, record: Arc<ResourceRecord>) {
        self.scopes.insert(node, record);
    }

    fn remove(&mut self, node: NodeId) -> Option<Arc<ResourceRecord>> {
        self.scopes.remove(&node)
    }

    /// Number of bound nodes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns `true` when no node is bound.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<MatchNode>,
}

/// Slot storage for [`MatchNode`]s with generational ids.
#[derive(Debug)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    scopes: ScopeTable,
    next_scope: u64,
    max_eval_depth: usize,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVAL_DEPTH)
    }
}

impl NodeArena {
    /// Creates an empty arena with the given nested-evaluation bound.
    pub fn new(max_eval_depth: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            scopes: ScopeTable::default(),
            next_scope: 0,
            max_eval_depth,
        }
    }

    /// Allocates an unbound node.
    pub fn spawn(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.node = Some(MatchNode::default());
                return NodeId {
                    index,
                    generation: slot.generation,
                };
            }
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(MatchNode::default()),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Frees `id`'s slot; later lookups through `id` return `None`.
    pub fn free(&mut self, id: NodeId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation || slot.node.is_none() {
            return;
        }
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.scopes.remove(id);
    }

    /// Live node behind `id`.
    pub fn node(&self, id: NodeId) -> Option<&MatchNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut MatchNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns `true` when no node is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The scope table.
    pub fn scopes(&self) -> &ScopeTable {
        &self.scopes
    }

    /// Record bound to `id`.
    pub fn record(&self, id: NodeId) -> Option<&Arc<ResourceRecord>> {
        self.scopes.get(id)
    }

    /// Binds `record` to `id`, rebuilding its docks 1:1 from the record's
    /// ports. Returns `false` for a stale id.
    pub fn bind(&mut self, id: NodeId, record: Arc<ResourceRecord>) -> bool {
        let scope_id = self.next_scope;
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        node.bound_resource = Some(record.key());
        node.docks = (0..record.ports().len()).map(Dock::new).collect();
        node.self_linked_dock = None;
        node.scope_id = scope_id;
        self.next_scope += 1;
        self.scopes.insert(id, record);
        true
    }

    /// Drops `id`'s binding and returns the record it held.
    pub fn unbind(&mut self, id: NodeId) -> Option<Arc<ResourceRecord>> {
        let node = self.node_mut(id)?;
        node.bound_resource = None;
        node.docks.clear();
        node.self_linked_dock = None;
        self.scopes.remove(id)
    }

    pub(crate) fn dock(&self, node: NodeId, dock: usize) -> Option<&Dock> {
        self.node(node).and_then(|n| n.docks.get(dock))
    }

    pub(crate) fn dock_mut(&mut self, node: NodeId, dock: usize) -> Option<&mut Dock> {
        self.node_mut(node).and_then(|n| n.docks.get_mut(dock))
    }

    /// Wires `child` port `child_port` to `parent` dock `dock`. The child's
    /// reciprocal dock is left unsatisfied.
    pub(crate) fn link(&mut self, parent: NodeId, dock: usize, child: NodeId, child_port: usize) {
        if let Some(d) = self.dock_mut(parent, dock) {
            d.bound_child = Some(child);
            d.linked_dock_index = Some(child_port);
            d.satisfied = false;
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some((parent, dock));
            c.self_linked_dock = Some(child_port);
            if let Some(cd) = c.docks.get_mut(child_port) {
                cd.satisfied = false;
            }
        }
    }

    /// Undoes [`link`](Self::link); the parent dock keeps holding the child.
    pub(crate) fn unlink(&mut self, parent: NodeId, dock: usize) {
        let child = match self.dock_mut(parent, dock) {
            Some(d) => {
                d.linked_dock_index = None;
                d.satisfied = false;
                d.bound_child
            }
            None => None,
        };
        if let Some(c) = child.and_then(|c| self.node_mut(c)) {
            c.parent = None;
            c.self_linked_dock = None;
        }
    }

    /// Moves `node`'s reciprocal link, keeping the parent's dock in step.
    pub(crate) fn set_self_link(&mut self, node: NodeId, dock: Option<usize>) {
        let Some(n) = self.node_mut(node) else {
            return;
        };
        n.self_linked_dock = dock;
        let parent = n.parent;
        if let Some((p, pd)) = parent {
            if let Some(d) = self.dock_mut(p, pd) {
                if d.bound_child == Some(node) {
                    d.linked_dock_index = dock;
                }
            }
        }
    }

    pub(crate) fn set_satisfied(&mut self, node: NodeId, dock: usize, satisfied: bool) {
        if let Some(d) = self.dock_mut(node, dock) {
            d.satisfied = satisfied;
        }
    }

    /// Requirements of `dock` AND, when `node` has a parent, the parent's
    /// requirements at the dock `node` fills.
    ///
    /// Both sides are evaluated as if `dock` were the reciprocal link, so the
    /// two ports' labels see each other. A stale id evaluates to `Error`.
    pub fn two_party_test(&self, node: NodeId, dock: usize) -> Value {
        let Some(n) = self.node(node) else {
            return Value::Error;
        };
        let own = Frame { node, port: dock };
        match n.parent {
            None => self.requirements(own, None),
            Some((p, pd)) => {
                let parent = Frame { node: p, port: pd };
                let link = Some(Link { child: own, parent });
                logical_and(
                    self.requirements(own, link),
                    self.requirements(parent, link),
                )
            }
        }
    }

    fn requirements(&self, frame: Frame, link: Option<Link>) -> Value {
        let Some(port) = self.scopes.get(frame.node).and_then(|r| r.port(frame.port)) else {
            return Value::Error;
        };
        let mut resolver = FrameResolver {
            arena: self,
            frame,
            link,
            active: Vec::new(),
        };
        port.requirements().evaluate(&mut resolver)
    }

    /// The frame bound across `frame`'s port.
    fn peer(&self, frame: Frame, link: Option<Link>) -> Option<Frame> {
        if let Some(link) = link {
            if frame == link.child {
                return Some(link.parent);
            }
            if frame == link.parent {
                return Some(link.child);
            }
        }
        let node = self.node(frame.node)?;
        if node.self_linked_dock == Some(frame.port) {
            if let Some((p, pd)) = node.parent {
                return Some(Frame { node: p, port: pd });
            }
        }
        let dock = node.docks.get(frame.port)?;
        Some(Frame {
            node: dock.bound_child?,
            port: dock.linked_dock_index?,
        })
    }
}

/// A port of a bound node: the evaluation context of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    node: NodeId,
    port: usize,
}

/// Link assumed during a two-party test.
#[derive(Debug, Clone, Copy)]
struct Link {
    child: Frame,
    parent: Frame,
}

/// Resolves names within a frame; `label.attr` crosses to the peer frame.
///
/// `active` holds the (frame, attribute) pairs being evaluated; reaching one
/// again is a cycle and evaluates to `Error`.
struct FrameResolver<'a> {
    arena: &'a NodeArena,
    frame: Frame,
    link: Option<Link>,
    active: Vec<(Frame, String)>,
}

impl FrameResolver<'_> {
    fn evaluate_in(&mut self, frame: Frame, name: &str, expr: &Expr) -> Value {
        let key = (frame, name.to_ascii_lowercase());
        if self.active.len() >= self.arena.max_eval_depth || self.active.contains(&key) {
            return Value::Error;
        }
        let outer = std::mem::replace(&mut self.frame, frame);
        self.active.push(key);
        let value = expr.evaluate(self);
        self.active.pop();
        self.frame = outer;
        value
    }
}

impl Resolve for FrameResolver<'_> {
    fn resolve(&mut self, reference: AttrRef<'_>) -> Value {
        let arena = self.arena;
        let Some(record) = arena.scopes.get(self.frame.node) else {
            return Value::Undefined;
        };
        match reference {
            AttrRef::Local(name) => match record.lookup(self.frame.port, name) {
                Some(expr) => self.evaluate_in(self.frame, name, expr),
                None => Value::Undefined,
            },
            AttrRef::Scoped { scope, name } => {
                let Some(port) = record.port_index(scope) else {
                    return Value::Undefined;
                };
                let here = Frame {
                    node: self.frame.node,
                    port,
                };
                let Some(peer) = arena.peer(here, self.link) else {
                    return Value::Undefined;
                };
                let Some(expr) = arena
                    .scopes
                    .get(peer.node)
                    .and_then(|r| r.lookup(peer.port, name))
                else {
                    return Value::Undefined;
                };
                self.evaluate_in(peer, name, expr)
            }
        }
    }
}
