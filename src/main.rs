use anyhow::{Context, Result};
use bazel_query_digest::cli::{Command, HashArgs, RootArgs, SourcesArgs};
use bazel_query_digest::digest::DigestEngine;
use bazel_query_digest::graph::TargetGraph;
use bazel_query_digest::{query, report};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() -> Result<()> {
    init_tracing();
    tracing::debug!(version = bazel_query_digest::version(), "bqd starting");
    let cli = RootArgs::parse();
    match cli.command {
        Command::Hash(args) => cmd_hash(args),
        Command::Sources(args) => cmd_sources(args),
    }
}

/// Diagnostics go to stderr so report JSON on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_hash(args: HashArgs) -> Result<()> {
    let query = query::load_query_file(&args.query)?;
    let graph = TargetGraph::from_query(query)?;
    let mut engine = DigestEngine::new(&args.workspace);
    let report = report::hash_report(&graph, &mut engine)?;
    tracing::info!(
        rules = report.targets.len(),
        file_reads = engine.stats().file_reads,
        diagnostics = engine.diagnostics().len(),
        "hashed rules"
    );
    write_report(args.out.as_deref(), &report)
}

fn cmd_sources(args: SourcesArgs) -> Result<()> {
    let query = query::load_query_file(&args.query)?;
    let graph = TargetGraph::from_query(query)?;
    let report = report::sources_report(&graph);
    write_report(args.out.as_deref(), &report)
}

fn write_report<T: Serialize>(out: Option<&Path>, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    match out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
