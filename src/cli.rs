//! CLI argument parsing for the digest tool.
//!
//! The CLI is intentionally thin: it routes a query file into the graph
//! builder and digest engine without embedding policy, so the same core can
//! be driven as a library.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "bqd",
    version,
    about = "Deterministic content digests for rules in a Bazel query result",
    after_help = "Examples:\n  bazel query --output=jsonproto \"deps(//...)\" > query.json\n  bqd hash --query query.json --out hashes.json\n  bqd sources --query query.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute a content digest per rule and emit a JSON report
    Hash(HashArgs),
    /// Dump each rule's declared input labels without hashing
    Sources(SourcesArgs),
}

/// Hash command inputs.
#[derive(Parser, Debug)]
#[command(about = "Compute a content digest per rule")]
pub struct HashArgs {
    /// Query result file (`bazel query --output=jsonproto ...`)
    #[arg(long, value_name = "FILE")]
    pub query: PathBuf,

    /// Workspace root that source file paths are resolved against
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,

    /// Output path for the JSON report (stdout when omitted)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

/// Sources command inputs.
#[derive(Parser, Debug)]
#[command(about = "Dump each rule's declared input labels")]
pub struct SourcesArgs {
    /// Query result file (`bazel query --output=jsonproto ...`)
    #[arg(long, value_name = "FILE")]
    pub query: PathBuf,

    /// Output path for the JSON report (stdout when omitted)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}
