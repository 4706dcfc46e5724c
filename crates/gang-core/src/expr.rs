// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribute expressions.
//!
//! Expressions are trees built programmatically or deserialized from JSON;
//! there is no textual grammar. Attribute references are resolved through the
//! [`Resolve`] seam so the same tree can be evaluated against a standalone
//! record, a live match tree, or a throwaway saturation chain.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attrs::AttributeRecord;
use crate::value::{
    arithmetic, compare, identical, logical_and, logical_not, logical_or, Arith, Relation, Value,
};

/// Maximum number of clauses produced by [`Expr::disjuncts`] before the
/// expression is kept whole.
pub const MAX_CLAUSES: usize = 64;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical negation.
    #[serde(rename = "not")]
    Not,
    /// Arithmetic negation.
    #[serde(rename = "neg")]
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Short-circuit conjunction.
    #[serde(rename = "and")]
    And,
    /// Short-circuit disjunction.
    #[serde(rename = "or")]
    Or,
    /// Equality (strings ignore case).
    #[serde(rename = "==")]
    Eq,
    /// Inequality.
    #[serde(rename = "!=")]
    Ne,
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Le,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Ge,
    /// Addition.
    #[serde(rename = "+")]
    Add,
    /// Subtraction.
    #[serde(rename = "-")]
    Sub,
    /// Multiplication.
    #[serde(rename = "*")]
    Mul,
    /// Division.
    #[serde(rename = "/")]
    Div,
    /// Remainder.
    #[serde(rename = "%")]
    Rem,
    /// Strict identity; always boolean.
    #[serde(rename = "is")]
    Is,
    /// Negated strict identity; always boolean.
    #[serde(rename = "isnt")]
    Isnt,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Is => "is",
            Self::Isnt => "isnt",
        }
    }
}

/// Expression tree.
///
/// JSON form (externally tagged): `{"lit": 3}`, `{"attr": "Memory"}`,
/// `{"select": ["cpu", "Arch"]}`, `{"record": {...}}`, `{"list": [...]}`,
/// `{"unary": ["not", e]}`, `{"binary": ["==", l, r]}`, `{"cond": [c, t, e]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Constant value.
    #[serde(rename = "lit")]
    Literal(Value),
    /// Unqualified attribute reference, resolved in the current scope.
    Attr(String),
    /// `scope.name`: reference through a port label.
    Select(String, String),
    /// Nested attribute record (port definitions).
    Record(AttributeRecord),
    /// List of expressions.
    List(Vec<Expr>),
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `if c then t else e`.
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// A reference found in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrRef<'a> {
    /// Unqualified name.
    Local(&'a str),
    /// `scope.name`.
    Scoped {
        /// Scope (port label) part.
        scope: &'a str,
        /// Attribute part.
        name: &'a str,
    },
}

/// Resolves attribute references during evaluation.
pub trait Resolve {
    /// Returns the value of `reference` in the resolver's current scope.
    fn resolve(&mut self, reference: AttrRef<'_>) -> Value;
}

impl Expr {
    /// Literal constructor.
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Unqualified attribute reference.
    pub fn attr(name: impl Into<String>) -> Self {
        Self::Attr(name.into())
    }

    /// `scope.name` reference.
    pub fn select(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Select(scope.into(), name.into())
    }

    /// Generic binary node.
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// `self && rhs`.
    pub fn and(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::And, self, rhs)
    }

    /// `self || rhs`.
    pub fn or(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Or, self, rhs)
    }

    /// `self == rhs`.
    pub fn equals(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs)
    }

    /// `self >= rhs`.
    pub fn at_least(self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs)
    }

    /// `!self`.
    pub fn negate(self) -> Self {
        Self::Unary(UnaryOp::Not, Box::new(self))
    }

    /// Returns the literal payload when this is a constant.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Evaluates the expression, resolving references through `resolver`.
    pub fn evaluate<R: Resolve + ?Sized>(&self, resolver: &mut R) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Attr(name) => resolver.resolve(AttrRef::Local(name)),
            Self::Select(scope, name) => resolver.resolve(AttrRef::Scoped { scope, name }),
            Self::Record(_) => Value::Error,
            Self::List(items) => Value::List(items.iter().map(|e| e.evaluate(resolver)).collect()),
            Self::Unary(UnaryOp::Not, e) => logical_not(e.evaluate(resolver)),
            Self::Unary(UnaryOp::Neg, e) => match e.evaluate(resolver) {
                Value::Integer(i) => i.checked_neg().map_or(Value::Error, Value::Integer),
                Value::Real(r) => Value::Real(-r),
                Value::Undefined => Value::Undefined,
                _ => Value::Error,
            },
            Self::Binary(op, lhs, rhs) => evaluate_binary(*op, lhs, rhs, resolver),
            Self::Cond(c, t, e) => match c.evaluate(resolver) {
                Value::Boolean(true) => t.evaluate(resolver),
                Value::Boolean(false) => e.evaluate(resolver),
                Value::Undefined => Value::Undefined,
                _ => Value::Error,
            },
        }
    }

    /// Appends every attribute reference in this expression to `out`.
    ///
    /// Nested records are separate scopes and are not descended into.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<AttrRef<'a>>) {
        match self {
            Self::Literal(_) | Self::Record(_) => {}
            Self::Attr(name) => out.push(AttrRef::Local(name)),
            Self::Select(scope, name) => out.push(AttrRef::Scoped { scope, name }),
            Self::List(items) => items.iter().for_each(|e| e.collect_references(out)),
            Self::Unary(_, e) => e.collect_references(out),
            Self::Binary(_, l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
            Self::Cond(c, t, e) => {
                c.collect_references(out);
                t.collect_references(out);
                e.collect_references(out);
            }
        }
    }

    /// Splits the expression into disjunctive normal form over `and`/`or`.
    ///
    /// Other operators are opaque atoms. When the expansion would exceed
    /// [`MAX_CLAUSES`] the expression is returned whole as a single clause.
    pub fn disjuncts(&self) -> Vec<Self> {
        match self {
            Self::Binary(BinaryOp::Or, l, r) => {
                let mut out = l.disjuncts();
                out.extend(r.disjuncts());
                if out.len() > MAX_CLAUSES {
                    return vec![self.clone()];
                }
                out
            }
            Self::Binary(BinaryOp::And, l, r) => {
                let left = l.disjuncts();
                let right = r.disjuncts();
                if left.len() * right.len() > MAX_CLAUSES {
                    return vec![self.clone()];
                }
                if left.len() == 1 && right.len() == 1 {
                    return vec![self.clone()];
                }
                let mut out = Vec::with_capacity(left.len() * right.len());
                for a in &left {
                    for b in &right {
                        out.push(a.clone().and(b.clone()));
                    }
                }
                out
            }
            _ => vec![self.clone()],
        }
    }
}

fn evaluate_binary<R: Resolve + ?Sized>(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    resolver: &mut R,
) -> Value {
    let left = lhs.evaluate(resolver);
    match op {
        BinaryOp::And => {
            if left == Value::Boolean(false) {
                return left;
            }
            logical_and(left, rhs.evaluate(resolver))
        }
        BinaryOp::Or => {
            if left.is_true() {
                return left;
            }
            logical_or(left, rhs.evaluate(resolver))
        }
        _ => {
            let right = rhs.evaluate(resolver);
            match op {
                BinaryOp::Eq => compare(Relation::Eq, &left, &right),
                BinaryOp::Ne => compare(Relation::Ne, &left, &right),
                BinaryOp::Lt => compare(Relation::Lt, &left, &right),
                BinaryOp::Le => compare(Relation::Le, &left, &right),
                BinaryOp::Gt => compare(Relation::Gt, &left, &right),
                BinaryOp::Ge => compare(Relation::Ge, &left, &right),
                BinaryOp::Add => arithmetic(Arith::Add, &left, &right),
                BinaryOp::Sub => arithmetic(Arith::Sub, &left, &right),
                BinaryOp::Mul => arithmetic(Arith::Mul, &left, &right),
                BinaryOp::Div => arithmetic(Arith::Div, &left, &right),
                BinaryOp::Rem => arithmetic(Arith::Rem, &left, &right),
                BinaryOp::Is => Value::Boolean(identical(&left, &right)),
                BinaryOp::Isnt => Value::Boolean(!identical(&left, &right)),
                BinaryOp::And | BinaryOp::Or => Value::Error,
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Attr(name) => f.write_str(name),
            Self::Select(scope, name) => write!(f, "{scope}.{name}"),
            Self::Record(record) => write!(f, "{record}"),
            Self::List(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            Self::Unary(UnaryOp::Not, e) => write!(f, "!({e})"),
            Self::Unary(UnaryOp::Neg, e) => write!(f, "-({e})"),
            Self::Binary(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            Self::Cond(c, t, e) => write!(f, "({c} ? {t} : {e})"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Resolves every reference to `Undefined` and counts lookups.
    struct Nothing(usize);

    impl Resolve for Nothing {
        fn resolve(&mut self, _reference: AttrRef<'_>) -> Value {
            self.0 += 1;
            Value::Undefined
        }
    }

    #[test]
    fn false_and_short_circuits() {
        let expr = Expr::lit(false).and(Expr::attr("Missing"));
        let mut r = Nothing(0);
        assert_eq!(expr.evaluate(&mut r), Value::Boolean(false));
        assert_eq!(r.0, 0);
    }

    #[test]
    fn undefined_reference_propagates_through_comparison() {
        let expr = Expr::select("cpu", "Arch").equals(Expr::lit("x86_64"));
        assert!(expr.evaluate(&mut Nothing(0)).is_undefined());
    }

    #[test]
    fn is_is_total() {
        let expr = Expr::binary(BinaryOp::Is, Expr::attr("X"), Expr::lit(Value::Undefined));
        assert!(expr.evaluate(&mut Nothing(0)).is_true());
    }

    #[test]
    fn disjuncts_distribute_and_over_or() {
        let a = Expr::attr("A");
        let b = Expr::attr("B");
        let c = Expr::attr("C");
        let expr = a.clone().or(b.clone()).and(c.clone());
        let clauses = expr.disjuncts();
        assert_eq!(clauses, vec![a.and(c.clone()), b.and(c)]);
    }

    #[test]
    fn json_form_round_trips_through_serde() {
        let json = r#"{"binary":["==",{"select":["other","Type"]},{"lit":"match"}]}"#;
        let expr: Expr = serde_json::from_str(json).unwrap();
        assert_eq!(
            expr,
            Expr::select("other", "Type").equals(Expr::lit("match"))
        );
    }
}
