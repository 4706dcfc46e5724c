// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `gang`: run the gang matcher over a JSON batch of records.
//!
//! # Usage
//! ```text
//! gang [--config DIR] [--log FILTER] <command>
//!
//!   check <batch>                     build every record, report rejections
//!   match <batch> --root KEY [--json] match one root against the rest
//!   negotiate <batch> [--json]        try every record as a root in key order
//!   saturate <batch> [--json]         print the saturated match-edge graph
//!   config [--write]                  print (or persist) the effective config
//! ```
//!
//! Settings come from `gang.json` in the config directory; flags override them.
#![deny(rust_2018_idioms)]
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
    clippy::dbg_macro
)]
// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod batch;
mod config;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gang_core::{negotiate, Direction, GangMatcher, MatchConfig, OfferPool, PortGraph};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::batch::Batch;
use crate::config::{CliConfig, ConfigService, FsConfigStore, OutputFormat, CONFIG_KEY};
use crate::render::MatchView;

#[derive(Parser, Debug)]
#[command(name = "gang", author, version, about = "Gang matching over JSON record batches")]
struct Cli {
    /// Directory holding `gang.json` (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Default log directive, e.g. `gang_core=debug`
    #[arg(long, global = true)]
    log: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every record of a batch and report rejections
    Check { batch: PathBuf },
    /// Match the record keyed `--root` against the rest of the batch
    Match {
        batch: PathBuf,
        #[arg(long)]
        root: i64,
        #[arg(long)]
        json: bool,
    },
    /// Try every record as a gang root, consuming gangs as they form
    Negotiate {
        batch: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Saturate the batch's port graph and print its match edges
    Saturate {
        batch: PathBuf,
        #[arg(long)]
        json: bool,
        /// Stop after this many passes
        #[arg(long)]
        max_passes: Option<usize>,
    },
    /// Print the effective configuration
    Config {
        /// Persist it to the config directory
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(dir) => FsConfigStore::at(dir.clone()),
        None => FsConfigStore::new().context("resolve config dir")?,
    };
    let service = ConfigService::new(store);
    let mut cfg: CliConfig = service
        .load(CONFIG_KEY)
        .with_context(|| format!("load config from {}", service.store().base().display()))?
        .unwrap_or_default();
    if let Some(filter) = cli.log {
        cfg.log_filter = filter;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(cfg.log_filter.parse()?))
        .init();
    debug!(config = ?cfg, "configuration loaded");

    match cli.command {
        Command::Check { batch } => check(&batch),
        Command::Match { batch, root, json } => {
            run_match(&batch, root, &cfg.engine, wants_json(json, &cfg))
        }
        Command::Negotiate { batch, json } => {
            run_negotiate(&batch, &cfg.engine, wants_json(json, &cfg))
        }
        Command::Saturate {
            batch,
            json,
            max_passes,
        } => {
            let mut engine = cfg.engine.clone();
            if max_passes.is_some() {
                engine.max_saturation_passes = max_passes;
            }
            run_saturate(&batch, engine, wants_json(json, &cfg))
        }
        Command::Config { write } => {
            if write {
                service.save(CONFIG_KEY, &cfg).context("save config")?;
                info!(dir = %service.store().base().display(), "config written");
            }
            print_json(&cfg)
        }
    }
}

fn wants_json(flag: bool, cfg: &CliConfig) -> bool {
    flag || cfg.output == OutputFormat::Json
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let batch = Batch::load(path)?;
    println!("{}", render::batch_table(&batch));
    if !batch.rejected.is_empty() {
        bail!("{} record(s) rejected", batch.rejected.len());
    }
    Ok(())
}

fn run_match(path: &Path, root: i64, engine: &MatchConfig, json: bool) -> Result<()> {
    let mut batch = Batch::load(path)?;
    let Some(record) = batch.take(root) else {
        bail!("no record keyed {root} in {}", path.display());
    };
    let pool: OfferPool = batch.records.into_iter().collect();
    let mut matcher = GangMatcher::new(pool, engine.clone());
    let node = matcher.root(record);
    let gang = if matcher.try_match(node, Direction::Advance) {
        matcher.gang(node)
    } else {
        None
    };
    let view = MatchView {
        root,
        gang,
        stats: *matcher.stats(),
    };
    if json {
        return print_json(&view);
    }
    match &view.gang {
        Some(gang) => println!("{}", render::gang_table(gang)),
        None => println!("no match for {root}"),
    }
    Ok(())
}

fn run_negotiate(path: &Path, engine: &MatchConfig, json: bool) -> Result<()> {
    let batch = Batch::load(path)?;
    let outcome = negotiate(batch.records.into_iter().collect(), engine.clone());
    if json {
        return print_json(&outcome);
    }
    println!("{}", render::gangs_table(&outcome.gangs));
    let unmatched: Vec<String> = outcome.unmatched.iter().map(ToString::to_string).collect();
    println!("unmatched: {}", unmatched.join(", "));
    Ok(())
}

fn run_saturate(path: &Path, engine: MatchConfig, json: bool) -> Result<()> {
    let batch = Batch::load(path)?;
    let mut graph = PortGraph::initialize(&batch.records, engine);
    let report = graph.saturate();
    let view = render::saturation_view(&graph, report);
    if json {
        return print_json(&view);
    }
    println!("{}", render::edges_table(&view));
    println!(
        "{} edge(s) after {} pass(es){}",
        view.edges.len(),
        report.passes,
        if report.converged { "" } else { " (pass limit reached)" }
    );
    Ok(())
}
