// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! gang-core: port-based gang matching.
//!
//! Records declare named ports whose `Requirements` constrain whatever binds
//! to them. [`GangMatcher`] searches an [`OfferPool`] for a set of records
//! whose ports are mutually satisfied, backtracking and returning every
//! tentatively claimed record when a branch fails. [`PortGraph`] answers the
//! static question of which ports can match at all, including matches that
//! only hold through chains of attribute dependencies.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate
)]

mod attrs;
mod config;
mod expr;
mod ident;
mod matcher;
mod negotiate;
mod node;
mod pool;
mod record;
mod saturate;
mod telemetry;
mod value;

pub use attrs::{
    decompose, split_reference, AttributeRecord, Clause, RecordScope, DEFAULT_MAX_EVAL_DEPTH,
};
pub use config::MatchConfig;
pub use expr::{AttrRef, BinaryOp, Expr, Resolve, UnaryOp, MAX_CLAUSES};
pub use ident::{EdgeId, ExtNodeId, NodeId, PortNodeId};
pub use matcher::{Direction, Gang, GangMatcher, GangMember, PeerRef, PortBinding};
pub use negotiate::{negotiate, NegotiationOutcome};
pub use node::{Dock, MatchNode, NodeArena, ScopeTable};
pub use pool::OfferPool;
pub use record::{Port, RecordError, ResourceRecord, LABEL_ATTR, PORTS_ATTR, REQUIREMENTS_ATTR};
pub use saturate::{
    AttrValueNode, ClauseNode, ExternalAttributeNode, MatchEdge, MatchPath, PortGraph, PortNode,
    SaturationReport,
};
pub use telemetry::SearchStats;
pub use value::{logical_and, logical_not, logical_or, Value};
