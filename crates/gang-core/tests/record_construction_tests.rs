// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]
mod common;

use common::{build, licensed_job, port, port_requiring, record_with};
use gang_core::{AttributeRecord, Expr, RecordError, ResourceRecord};

#[test]
fn earlier_port_references_become_dependencies() {
    let job = licensed_job(1);
    let lic = &job.ports()[1];
    assert_eq!(lic.label(), "lic");
    assert_eq!(
        lic.dependencies().iter().collect::<Vec<_>>(),
        vec!["cpu"]
    );
    assert!(job.ports()[0].dependencies().is_empty());
    assert!(!lic.attributes().contains("Requirements"));
}

#[test]
fn forward_reference_is_rejected() {
    let rec = record_with(
        AttributeRecord::new(),
        vec![
            port_requiring("a", Expr::select("b", "Arch").equals(Expr::lit("x86_64"))),
            port("b"),
        ],
    );
    assert_eq!(
        ResourceRecord::make(1, rec),
        Err(RecordError::IllegalDependency {
            port: "a".into(),
            reference: "b.Arch".into(),
        })
    );
}

#[test]
fn unknown_label_is_rejected_even_in_plain_attributes() {
    let rec = record_with(
        AttributeRecord::new(),
        vec![port("cpu").with("Host", Expr::select("gpu", "Name"))],
    );
    assert!(matches!(
        ResourceRecord::make(1, rec),
        Err(RecordError::IllegalDependency { .. })
    ));
}

#[test]
fn references_through_record_attributes_are_followed() {
    // `Wanted` lives on the record and reads a port declared later.
    let rec = record_with(
        AttributeRecord::new().with("Wanted", Expr::select("late", "Name")),
        vec![
            port_requiring("early", Expr::select("early", "Name").equals(Expr::attr("Wanted"))),
            port("late"),
        ],
    );
    assert_eq!(
        ResourceRecord::make(1, rec),
        Err(RecordError::IllegalDependency {
            port: "early".into(),
            reference: "late.Name".into(),
        })
    );
}

#[test]
fn own_label_references_are_ignored() {
    let rec = record_with(
        AttributeRecord::new(),
        vec![port_requiring(
            "peer",
            Expr::select("PEER", "Type").equals(Expr::lit("x")),
        )],
    );
    let built = build(1, rec);
    assert!(built.ports()[0].dependencies().is_empty());
}

#[test]
fn records_deserialize_from_json() {
    let json = r#"{
        "Type": {"lit": "Job"},
        "Ports": {"list": [
            {"record": {
                "label": {"lit": "cpu"},
                "Requirements": {"binary": ["==", {"select": ["cpu", "Type"]}, {"lit": "Machine"}]}
            }}
        ]}
    }"#;
    let rec: AttributeRecord = serde_json::from_str(json).unwrap();
    let built = ResourceRecord::make(5, rec).unwrap();
    assert_eq!(built.key(), 5);
    assert_eq!(built.port_index("CPU"), Some(0));
    assert_eq!(
        built.ports()[0].requirements(),
        &Expr::select("cpu", "Type").equals(Expr::lit("Machine"))
    );
}
