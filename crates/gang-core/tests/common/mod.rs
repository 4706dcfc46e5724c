// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code, clippy::unwrap_used)]
use gang_core::{
    AttributeRecord, Expr, OfferPool, ResourceRecord, LABEL_ATTR, PORTS_ATTR, REQUIREMENTS_ATTR,
};

/// Port definition with only a label.
pub fn port(label: &str) -> AttributeRecord {
    AttributeRecord::new().with(LABEL_ATTR, Expr::lit(label))
}

/// Port definition with a label and requirements.
pub fn port_requiring(label: &str, requirements: Expr) -> AttributeRecord {
    port(label).with(REQUIREMENTS_ATTR, requirements)
}

/// Record-level attributes plus a `Ports` list.
pub fn record_with(attrs: AttributeRecord, ports: Vec<AttributeRecord>) -> AttributeRecord {
    let mut rec = attrs;
    rec.insert(
        PORTS_ATTR,
        Expr::List(ports.into_iter().map(Expr::Record).collect()),
    );
    rec
}

pub fn build(key: i64, rec: AttributeRecord) -> ResourceRecord {
    ResourceRecord::make(key, rec).unwrap()
}

/// Single-port record: `Type = ty`, port `other` requiring `other.Type == "match"`.
pub fn reciprocal(key: i64, ty: &str) -> ResourceRecord {
    build(
        key,
        record_with(
            AttributeRecord::new().with("Type", Expr::lit(ty)),
            vec![port_requiring(
                "other",
                Expr::select("other", "Type").equals(Expr::lit("match")),
            )],
        ),
    )
}

/// Job with a `cpu` port wanting a machine and a `lic` port wanting a license
/// for the machine bound at `cpu`.
pub fn licensed_job(key: i64) -> ResourceRecord {
    build(
        key,
        record_with(
            AttributeRecord::new().with("Type", Expr::lit("Job")),
            vec![
                port_requiring(
                    "cpu",
                    Expr::select("cpu", "Type").equals(Expr::lit("Machine")),
                ),
                port_requiring(
                    "lic",
                    Expr::select("lic", "Type")
                        .equals(Expr::lit("License"))
                        .and(Expr::select("lic", "Host").equals(Expr::select("cpu", "Name"))),
                ),
            ],
        ),
    )
}

/// Machine offering one port; `name` becomes the port's `Name` attribute.
pub fn machine(key: i64, name: Option<&str>) -> ResourceRecord {
    let mut host = port("host").with("Type", Expr::lit("Machine"));
    if let Some(name) = name {
        host.insert("Name", Expr::lit(name));
    }
    build(key, record_with(AttributeRecord::new(), vec![host]))
}

/// License bound to host `host`.
pub fn license(key: i64, host: &str) -> ResourceRecord {
    let user = port("user")
        .with("Type", Expr::lit("License"))
        .with("Host", Expr::lit(host));
    build(key, record_with(AttributeRecord::new(), vec![user]))
}

pub fn pool_of(records: impl IntoIterator<Item = ResourceRecord>) -> OfferPool {
    records.into_iter().collect()
}
