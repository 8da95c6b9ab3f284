//! Deterministic content digests for rules in a Bazel query result.
//!
//! Feed a decoded query result into [`graph::TargetGraph::from_query`], then
//! ask a [`digest::DigestEngine`] for the digest of any rule label. A rule's
//! digest covers its declared attributes and the transitive closure of its
//! rule inputs, down to source file contents, so a changed digest means the
//! rule's effective inputs changed.

pub mod cli;
pub mod digest;
pub mod graph;
pub mod query;
pub mod report;
pub mod resolve;

pub use digest::{Diagnostic, Digest, DigestEngine, DigestError, EngineStats};
pub use graph::{build_graph, label_of, GraphError, Label, Target, TargetGraph};

/// Crate version, for run logs.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
