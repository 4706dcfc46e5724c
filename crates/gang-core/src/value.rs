// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Three-valued attribute values and their logical/comparison operators.
//!
//! `Undefined` and `Error` are ordinary variants: every operator in this
//! module is total and propagates them instead of failing.
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of evaluating an attribute or expression.
///
/// `Integer` and `Real` together form the numeric domain; mixed arithmetic
/// promotes to `Real`. Serialized untagged, so JSON scalars map directly onto
/// the corresponding variant and `null` maps onto `Undefined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean literal.
    Boolean(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// String; equality and ordering ignore ASCII case.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Absence of information (missing attribute, unbound scope).
    Undefined,
    /// Evaluation error (type mismatch, division by zero, depth limit).
    #[serde(skip)]
    Error,
}

impl Value {
    /// Returns `true` only for `Boolean(true)`.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    /// Returns `true` for `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` for `Error`.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value (integers widen to `f64`).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Short type name used in logs and CLI output.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Undefined => "undefined",
            Self::Error => "error",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::String(s) => write!(f, "{s:?}"),
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
            Self::Undefined => f.write_str("undefined"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Three-valued conjunction.
///
/// Precedence of outcomes: `Error`, then `false`, then `Undefined`, then
/// `true`. Non-boolean, non-undefined operands are errors.
pub fn logical_and(lhs: Value, rhs: Value) -> Value {
    match (truth(&lhs), truth(&rhs)) {
        (Truth::Error, _) | (_, Truth::Error) => Value::Error,
        (Truth::False, _) | (_, Truth::False) => Value::Boolean(false),
        (Truth::Undefined, _) | (_, Truth::Undefined) => Value::Undefined,
        (Truth::True, Truth::True) => Value::Boolean(true),
    }
}

/// Three-valued disjunction: `Error`, then `true`, then `Undefined`, then `false`.
pub fn logical_or(lhs: Value, rhs: Value) -> Value {
    match (truth(&lhs), truth(&rhs)) {
        (Truth::Error, _) | (_, Truth::Error) => Value::Error,
        (Truth::True, _) | (_, Truth::True) => Value::Boolean(true),
        (Truth::Undefined, _) | (_, Truth::Undefined) => Value::Undefined,
        (Truth::False, Truth::False) => Value::Boolean(false),
    }
}

/// Three-valued negation.
pub fn logical_not(value: Value) -> Value {
    match truth(&value) {
        Truth::True => Value::Boolean(false),
        Truth::False => Value::Boolean(true),
        Truth::Undefined => Value::Undefined,
        Truth::Error => Value::Error,
    }
}

#[derive(Clone, Copy)]
enum Truth {
    True,
    False,
    Undefined,
    Error,
}

fn truth(value: &Value) -> Truth {
    match value {
        Value::Boolean(true) => Truth::True,
        Value::Boolean(false) => Truth::False,
        Value::Undefined => Truth::Undefined,
        _ => Truth::Error,
    }
}

/// Relational operators shared by the expression evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Compares two values under `relation`.
///
/// `Undefined` on either side yields `Undefined`; `Error` or a type mismatch
/// yields `Error`. Strings compare ignoring ASCII case.
pub(crate) fn compare(relation: Relation, lhs: &Value, rhs: &Value) -> Value {
    if lhs.is_error() || rhs.is_error() {
        return Value::Error;
    }
    if lhs.is_undefined() || rhs.is_undefined() {
        return Value::Undefined;
    }
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(cmp_ignore_case(a, b)),
        (Value::Boolean(a), Value::Boolean(b)) => {
            return match relation {
                Relation::Eq => Value::Boolean(a == b),
                Relation::Ne => Value::Boolean(a != b),
                _ => Value::Error,
            };
        }
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Value::Error,
        },
    };
    let Some(ordering) = ordering else {
        // NaN on either side.
        return Value::Boolean(relation == Relation::Ne);
    };
    Value::Boolean(match relation {
        Relation::Eq => ordering == Ordering::Equal,
        Relation::Ne => ordering != Ordering::Equal,
        Relation::Lt => ordering == Ordering::Less,
        Relation::Le => ordering != Ordering::Greater,
        Relation::Gt => ordering == Ordering::Greater,
        Relation::Ge => ordering != Ordering::Less,
    })
}

/// Strict identity (`is`): same variant and same payload; never undefined.
pub(crate) fn identical(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| identical(x, y))
        }
        (Value::Undefined, Value::Undefined) | (Value::Error, Value::Error) => true,
        _ => false,
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Arithmetic operators shared by the expression evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

pub(crate) fn arithmetic(op: Arith, lhs: &Value, rhs: &Value) -> Value {
    if lhs.is_error() || rhs.is_error() {
        return Value::Error;
    }
    if lhs.is_undefined() || rhs.is_undefined() {
        return Value::Undefined;
    }
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => {
            let out = match op {
                Arith::Add => a.checked_add(*b),
                Arith::Sub => a.checked_sub(*b),
                Arith::Mul => a.checked_mul(*b),
                Arith::Div => a.checked_div(*b),
                Arith::Rem => a.checked_rem(*b),
            };
            out.map_or(Value::Error, Value::Integer)
        }
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => match op {
                Arith::Add => Value::Real(a + b),
                Arith::Sub => Value::Real(a - b),
                Arith::Mul => Value::Real(a * b),
                Arith::Div if b == 0.0 => Value::Error,
                Arith::Div => Value::Real(a / b),
                Arith::Rem if b == 0.0 => Value::Error,
                Arith::Rem => Value::Real(a % b),
            },
            _ => Value::Error,
        },
    }
}
