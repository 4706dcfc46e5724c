// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribute records and scope-aware evaluation helpers.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::{AttrRef, Expr, Resolve};
use crate::value::Value;

/// Default bound on nested attribute evaluation.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 64;

/// Immutable mapping from attribute name to expression.
///
/// Names are case-insensitive; the spelling used at insertion is kept for
/// display and serialization. Iteration follows the lowercased name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Expr>", into = "BTreeMap<String, Expr>")]
pub struct AttributeRecord {
    entries: BTreeMap<String, (String, Expr)>,
}

impl AttributeRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.insert(name, expr);
        self
    }

    /// Inserts or replaces `name`, returning the previous expression.
    pub fn insert(&mut self, name: impl Into<String>, expr: Expr) -> Option<Expr> {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), (name, expr))
            .map(|(_, old)| old)
    }

    /// Looks up `name` ignoring case.
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, expr)| expr)
    }

    /// Returns `true` when `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterates `(name, expr)` pairs in lowercased-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.entries
            .values()
            .map(|(name, expr)| (name.as_str(), expr))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the record has no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluates `name` with only this record in scope.
    pub fn evaluate(&self, name: &str) -> Value {
        RecordScope::new(self).evaluate_attr(name)
    }
}

impl From<BTreeMap<String, Expr>> for AttributeRecord {
    fn from(map: BTreeMap<String, Expr>) -> Self {
        let mut record = Self::new();
        for (name, expr) in map {
            record.insert(name, expr);
        }
        record
    }
}

impl From<AttributeRecord> for BTreeMap<String, Expr> {
    fn from(record: AttributeRecord) -> Self {
        record.entries.into_values().collect()
    }
}

impl fmt::Display for AttributeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (name, expr)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, " {name} = {expr}")?;
        }
        f.write_str(" ]")
    }
}

/// Splits a `scope.attr` reference string at its first dot.
pub fn split_reference(reference: &str) -> Option<(&str, &str)> {
    reference.split_once('.')
}

/// Two-level lexical scope: a port record nested inside its resource record.
///
/// Unqualified names resolve in `inner` first, then in `outer`. Scoped
/// (`label.attr`) references are external to the scope and evaluate to
/// `Undefined` here.
#[derive(Debug, Clone, Copy)]
pub struct RecordScope<'a> {
    inner: &'a AttributeRecord,
    outer: Option<&'a AttributeRecord>,
    max_depth: usize,
}

impl<'a> RecordScope<'a> {
    /// Scope over a single record.
    pub fn new(record: &'a AttributeRecord) -> Self {
        Self {
            inner: record,
            outer: None,
            max_depth: DEFAULT_MAX_EVAL_DEPTH,
        }
    }

    /// Scope over a port record nested in `outer`.
    pub fn nested(inner: &'a AttributeRecord, outer: &'a AttributeRecord) -> Self {
        Self {
            inner,
            outer: Some(outer),
            max_depth: DEFAULT_MAX_EVAL_DEPTH,
        }
    }

    /// Overrides the nested-evaluation bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolves an unqualified name through the scope chain.
    pub fn lookup(&self, name: &str) -> Option<&'a Expr> {
        self.inner
            .get(name)
            .or_else(|| self.outer.and_then(|o| o.get(name)))
    }

    /// Evaluates the attribute `name`; missing attributes are `Undefined`.
    pub fn evaluate_attr(&self, name: &str) -> Value {
        self.lookup(name)
            .map_or(Value::Undefined, |expr| self.evaluate(expr))
    }

    /// Evaluates `expr` inside this scope.
    pub fn evaluate(&self, expr: &Expr) -> Value {
        let mut resolver = LocalResolver {
            scope: *self,
            active: Vec::new(),
        };
        expr.evaluate(&mut resolver)
    }

    /// Reports the `label.attr` references `expr` makes outside this scope.
    ///
    /// With `stop_at_self` only the references written in `expr` itself are
    /// reported. Without it, unqualified references to attributes of this
    /// scope are inlined transitively (each attribute at most once), so
    /// indirect external references surface as well.
    pub fn external_references(&self, expr: &Expr, stop_at_self: bool) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut inlined = BTreeSet::new();
        self.walk_references(expr, stop_at_self, &mut inlined, &mut out);
        out
    }

    /// Evaluates `expr` when it has no external references.
    pub fn flatten(&self, expr: &Expr) -> Option<Value> {
        if self.external_references(expr, false).is_empty() {
            Some(self.evaluate(expr))
        } else {
            None
        }
    }

    fn walk_references(
        &self,
        expr: &Expr,
        stop_at_self: bool,
        inlined: &mut BTreeSet<String>,
        out: &mut BTreeSet<String>,
    ) {
        let mut refs = Vec::new();
        expr.collect_references(&mut refs);
        for reference in refs {
            match reference {
                AttrRef::Scoped { scope, name } => {
                    out.insert(format!("{scope}.{name}"));
                }
                AttrRef::Local(name) if !stop_at_self => {
                    if let Some(local) = self.lookup(name) {
                        if inlined.insert(name.to_ascii_lowercase()) {
                            self.walk_references(local, stop_at_self, inlined, out);
                        }
                    }
                }
                AttrRef::Local(_) => {}
            }
        }
    }
}

/// Attributes under evaluation, innermost last. Re-entering one is a cycle.
struct LocalResolver<'a> {
    scope: RecordScope<'a>,
    active: Vec<String>,
}

impl Resolve for LocalResolver<'_> {
    fn resolve(&mut self, reference: AttrRef<'_>) -> Value {
        match reference {
            AttrRef::Local(name) => {
                let Some(expr) = self.scope.lookup(name) else {
                    return Value::Undefined;
                };
                let key = name.to_ascii_lowercase();
                if self.active.len() >= self.scope.max_depth || self.active.contains(&key) {
                    return Value::Error;
                }
                self.active.push(key);
                let value = expr.evaluate(self);
                self.active.pop();
                value
            }
            AttrRef::Scoped { .. } => Value::Undefined,
        }
    }
}

/// One independently testable disjunct of a requirements expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// The disjunct.
    pub expr: Expr,
    /// External `label.attr` references the disjunct needs (inlined).
    pub references: BTreeSet<String>,
}

/// Splits `expr` into disjunctive clauses with their external references.
pub fn decompose(expr: &Expr, scope: &RecordScope<'_>) -> Vec<Clause> {
    expr.disjuncts()
        .into_iter()
        .map(|clause| Clause {
            references: scope.external_references(&clause, false),
            expr: clause,
        })
        .collect()
}
