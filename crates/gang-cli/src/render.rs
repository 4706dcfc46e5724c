// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Table and JSON views of engine results.

use comfy_table::Table;
use gang_core::{Gang, GangMember, MatchEdge, PortGraph, SaturationReport, SearchStats};
use serde::Serialize;

use crate::batch::Batch;

/// A port named by record key and label.
#[derive(Debug, Clone, Serialize)]
pub struct PortName {
    pub key: i64,
    pub label: String,
}

/// A match edge with its endpoints resolved to names.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub id: usize,
    pub source: Option<PortName>,
    pub target: Option<PortName>,
    pub annotations: Vec<Vec<usize>>,
}

#[derive(Debug, Serialize)]
pub struct SaturationView {
    pub report: SaturationReport,
    pub edges: Vec<EdgeView>,
}

#[derive(Debug, Serialize)]
pub struct MatchView {
    pub root: i64,
    pub gang: Option<Gang>,
    pub stats: SearchStats,
}

pub fn batch_table(batch: &Batch) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Key", "Status", "Detail"]);
    for record in &batch.records {
        let labels: Vec<&str> = record.ports().iter().map(|p| p.label()).collect();
        table.add_row(vec![
            record.key().to_string(),
            "ok".to_owned(),
            format!("ports: {}", labels.join(", ")),
        ]);
    }
    for rejection in &batch.rejected {
        table.add_row(vec![
            rejection.key.to_string(),
            "rejected".to_owned(),
            rejection.reason.clone(),
        ]);
    }
    table
}

/// One row per port of every member, depth first.
pub fn gang_table(gang: &Gang) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Member", "Port", "Peer"]);
    add_member_rows(&mut table, &gang.root);
    table
}

fn add_member_rows(table: &mut Table, member: &GangMember) {
    for binding in &member.ports {
        let peer = binding
            .peer
            .as_ref()
            .map_or_else(|| "-".to_owned(), |p| format!("{}.{}", p.key, p.label));
        table.add_row(vec![member.key.to_string(), binding.label.clone(), peer]);
    }
    for child in member.ports.iter().filter_map(|b| b.member.as_ref()) {
        add_member_rows(table, child);
    }
}

pub fn gangs_table(gangs: &[Gang]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Gang", "Members"]);
    for (index, gang) in gangs.iter().enumerate() {
        let keys: Vec<String> = gang.keys().iter().map(ToString::to_string).collect();
        table.add_row(vec![index.to_string(), keys.join(", ")]);
    }
    table
}

pub fn saturation_view(graph: &PortGraph, report: SaturationReport) -> SaturationView {
    SaturationView {
        report,
        edges: graph.edges().iter().map(|e| edge_view(graph, e)).collect(),
    }
}

fn edge_view(graph: &PortGraph, edge: &MatchEdge) -> EdgeView {
    let name = |id| {
        graph.describe_port(id).map(|(key, label)| PortName {
            key,
            label: label.to_owned(),
        })
    };
    EdgeView {
        id: edge.id.0,
        source: name(edge.source),
        target: name(edge.target),
        annotations: edge
            .annotations
            .iter()
            .map(|path| path.edges.iter().map(|e| e.0).collect())
            .collect(),
    }
}

pub fn edges_table(view: &SaturationView) -> Table {
    let port = |p: Option<&PortName>| {
        p.map_or_else(|| "?".to_owned(), |p| format!("{}.{}", p.key, p.label))
    };
    let mut table = Table::new();
    table.set_header(vec!["Edge", "Source", "Target", "Via"]);
    for edge in &view.edges {
        let via: Vec<String> = edge
            .annotations
            .iter()
            .map(|path| {
                let hops: Vec<String> = path.iter().map(|e| format!("e{e}")).collect();
                format!("[{}]", hops.join(" > "))
            })
            .collect();
        table.add_row(vec![
            format!("e{}", edge.id),
            port(edge.source.as_ref()),
            port(edge.target.as_ref()),
            via.join(" "),
        ]);
    }
    table
}
