// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier types for the match arena and the saturation graph.
use std::fmt;

use serde::Serialize;

/// Generational handle to a [`MatchNode`](crate::MatchNode) in a
/// [`NodeArena`](crate::NodeArena).
///
/// The generation is bumped whenever a slot is freed, so a stale id never
/// aliases the node that later reuses its slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at the time this id was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

/// Index of a port node in a [`PortGraph`](crate::PortGraph).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct PortNodeId(pub usize);

/// Index of an external attribute node in a [`PortGraph`](crate::PortGraph).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct ExtNodeId(pub usize);

/// Identifier of a match edge; edges are numbered in insertion order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}
