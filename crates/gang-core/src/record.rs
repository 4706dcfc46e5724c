// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Validated resource records and their ports.
use std::collections::BTreeSet;

use thiserror::Error;

use crate::attrs::{split_reference, AttributeRecord, RecordScope};
use crate::expr::Expr;
use crate::value::Value;

/// Name of the list attribute holding port definitions.
pub const PORTS_ATTR: &str = "Ports";
/// Name of the label attribute inside a port definition.
pub const LABEL_ATTR: &str = "label";
/// Name of the requirements attribute inside a port definition.
pub const REQUIREMENTS_ATTR: &str = "Requirements";

/// Construction failures for [`ResourceRecord::make`].
///
/// Every variant rejects the whole record; nothing is partially built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record has no `Ports` attribute.
    #[error("record has no `Ports` attribute")]
    MissingPortsAttribute,
    /// `Ports` is not a list expression.
    #[error("`Ports` is not a list")]
    PortsNotAList,
    /// Element `index` of `Ports` is not a nested record.
    #[error("port #{index} is not a record")]
    PortNotARecord {
        /// Position in the `Ports` list.
        index: usize,
    },
    /// Element `index` has no non-empty string `label`.
    #[error("port #{index} has no string label")]
    MissingLabel {
        /// Position in the `Ports` list.
        index: usize,
    },
    /// Two ports share a label (compared ignoring case).
    #[error("duplicate port label `{label}`")]
    DuplicateLabel {
        /// The repeated label.
        label: String,
    },
    /// A port references a label that is neither its own nor an earlier port's.
    #[error("port `{port}` has illegal dependency `{reference}`")]
    IllegalDependency {
        /// Label of the offending port.
        port: String,
        /// The `label.attr` reference.
        reference: String,
    },
}

/// One validated port of a [`ResourceRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    label: String,
    attributes: AttributeRecord,
    requirements: Expr,
    dependencies: BTreeSet<String>,
}

impl Port {
    /// The port label as written.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Port attributes, requirements excluded.
    pub fn attributes(&self) -> &AttributeRecord {
        &self.attributes
    }

    /// Requirements over whatever connects to this port (`true` when absent).
    pub fn requirements(&self) -> &Expr {
        &self.requirements
    }

    /// Labels of earlier ports the requirements depend on.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Returns `true` when `label` names this port (ignoring case).
    pub fn is_labelled(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

/// A validated, port-indexed attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    key: i64,
    source: AttributeRecord,
    ports: Vec<Port>,
}

impl ResourceRecord {
    /// Validates `source` and indexes its ports.
    ///
    /// # Errors
    /// Returns a [`RecordError`] describing the first violation found.
    pub fn make(key: i64, source: AttributeRecord) -> Result<Self, RecordError> {
        let Some(ports_expr) = source.get(PORTS_ATTR) else {
            return Err(RecordError::MissingPortsAttribute);
        };
        let Expr::List(items) = ports_expr else {
            return Err(RecordError::PortsNotAList);
        };
        let mut ports: Vec<Port> = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let Expr::Record(def) = item else {
                return Err(RecordError::PortNotARecord { index });
            };
            let port = build_port(index, def, &source, &ports)?;
            ports.push(port);
        }
        Ok(Self { key, source, ports })
    }

    /// Pool key.
    pub fn key(&self) -> i64 {
        self.key
    }

    /// The attribute record the ports were built from.
    pub fn source(&self) -> &AttributeRecord {
        &self.source
    }

    /// Ports in declaration order.
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Port at `index`.
    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Position of the port labelled `label` (ignoring case).
    pub fn port_index(&self, label: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.is_labelled(label))
    }

    /// Resolves an unqualified name as seen from port `port`: the port's own
    /// attributes first, then the enclosing record.
    pub fn lookup(&self, port: usize, name: &str) -> Option<&Expr> {
        self.ports
            .get(port)
            .and_then(|p| p.attributes.get(name))
            .or_else(|| self.source.get(name))
    }

    /// Evaluation scope of port `port` with no peers bound.
    pub fn scope(&self, port: usize) -> Option<RecordScope<'_>> {
        self.ports
            .get(port)
            .map(|p| RecordScope::nested(&p.attributes, &self.source))
    }
}

fn build_port(
    index: usize,
    def: &AttributeRecord,
    source: &AttributeRecord,
    earlier: &[Port],
) -> Result<Port, RecordError> {
    let label = match def.get(LABEL_ATTR).and_then(Expr::as_literal) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(RecordError::MissingLabel { index }),
    };
    if earlier.iter().any(|p| p.is_labelled(&label)) {
        return Err(RecordError::DuplicateLabel { label });
    }

    let scope = RecordScope::nested(def, source);
    let mut attributes = AttributeRecord::new();
    let mut requirements = None;
    let mut dependencies = BTreeSet::new();
    for (name, expr) in def.iter() {
        if name.eq_ignore_ascii_case(LABEL_ATTR) {
            attributes.insert(name, expr.clone());
            continue;
        }
        let is_requirements = name.eq_ignore_ascii_case(REQUIREMENTS_ATTR);
        for reference in scope.external_references(expr, false) {
            let Some((scope_label, _)) = split_reference(&reference) else {
                continue;
            };
            if scope_label.eq_ignore_ascii_case(&label) {
                continue;
            }
            match earlier.iter().find(|p| p.is_labelled(scope_label)) {
                Some(dep) => {
                    if is_requirements {
                        dependencies.insert(dep.label.clone());
                    }
                }
                None => {
                    return Err(RecordError::IllegalDependency {
                        port: label,
                        reference,
                    })
                }
            }
        }
        if is_requirements {
            requirements = Some(expr.clone());
        } else {
            attributes.insert(name, expr.clone());
        }
    }

    Ok(Port {
        label,
        attributes,
        requirements: requirements.unwrap_or_else(|| Expr::lit(true)),
        dependencies,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record_with_ports(ports: Vec<Expr>) -> AttributeRecord {
        AttributeRecord::new().with(PORTS_ATTR, Expr::List(ports))
    }

    fn port(label: &str) -> AttributeRecord {
        AttributeRecord::new().with(LABEL_ATTR, Expr::lit(label))
    }

    #[test]
    fn missing_requirements_default_to_true() {
        let rec = record_with_ports(vec![Expr::Record(port("cpu"))]);
        let built = ResourceRecord::make(1, rec).unwrap();
        assert_eq!(built.ports()[0].requirements(), &Expr::lit(true));
    }

    #[test]
    fn shape_errors_are_reported() {
        assert_eq!(
            ResourceRecord::make(1, AttributeRecord::new()),
            Err(RecordError::MissingPortsAttribute)
        );
        let not_list = AttributeRecord::new().with(PORTS_ATTR, Expr::lit(3_i64));
        assert_eq!(
            ResourceRecord::make(1, not_list),
            Err(RecordError::PortsNotAList)
        );
        let not_record = record_with_ports(vec![Expr::lit("cpu")]);
        assert_eq!(
            ResourceRecord::make(1, not_record),
            Err(RecordError::PortNotARecord { index: 0 })
        );
        let unlabelled = record_with_ports(vec![Expr::Record(AttributeRecord::new())]);
        assert_eq!(
            ResourceRecord::make(1, unlabelled),
            Err(RecordError::MissingLabel { index: 0 })
        );
    }

    #[test]
    fn duplicate_labels_ignore_case() {
        let rec = record_with_ports(vec![Expr::Record(port("cpu")), Expr::Record(port("CPU"))]);
        assert_eq!(
            ResourceRecord::make(1, rec),
            Err(RecordError::DuplicateLabel {
                label: "CPU".into()
            })
        );
    }

    #[test]
    fn lookup_prefers_port_over_record() {
        let rec = record_with_ports(vec![Expr::Record(
            port("cpu").with("Arch", Expr::lit("arm64")),
        )])
        .with("Arch", Expr::lit("x86_64"))
        .with("Owner", Expr::lit("alice"));
        let built = ResourceRecord::make(1, rec).unwrap();
        assert_eq!(built.lookup(0, "arch"), Some(&Expr::lit("arm64")));
        assert_eq!(built.lookup(0, "Owner"), Some(&Expr::lit("alice")));
        assert_eq!(built.port_index("CPU"), Some(0));
    }
}
