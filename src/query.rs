//! Thin decode boundary for Bazel query results.
//!
//! Accepts the `--output=jsonproto` encoding of `blaze_query.QueryResult`
//! (`bazel query --output=jsonproto "deps(//...)" > query.json`). The types here
//! mirror the wire shape one-to-one; conversion into the typed graph model,
//! including rejection of unrecognized kinds, happens in [`crate::graph`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level query result: the flat target list.
#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub target: Vec<RawTarget>,
}

/// Wire discriminator for target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    Rule,
    SourceFile,
    GeneratedFile,
    PackageGroup,
    /// Any kind this tool does not model; rejected at graph build.
    #[serde(other)]
    Unrecognized,
}

/// One target as it appears on the wire: a kind tag plus the matching payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTarget {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub rule: Option<RawRule>,
    pub source_file: Option<RawSourceFile>,
    pub generated_file: Option<RawGeneratedFile>,
    pub package_group: Option<RawPackageGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    pub name: String,
    #[serde(default)]
    pub rule_class: String,
    #[serde(default)]
    pub attribute: Vec<RawAttribute>,
    #[serde(default)]
    pub rule_input: Vec<String>,
}

/// A rule attribute: its name plus whatever typed value fields the query
/// emitted, captured verbatim.
#[derive(Debug, Deserialize)]
pub struct RawAttribute {
    pub name: String,
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl RawAttribute {
    /// Serialize the attribute body to canonical bytes. The backing map is
    /// key-ordered, so wire field order does not leak into the result.
    pub fn canonical_bytes(self) -> Result<(String, Vec<u8>), serde_json::Error> {
        let bytes = serde_json::to_vec(&serde_json::Value::Object(self.body))?;
        Ok((self.name, bytes))
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSourceFile {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGeneratedFile {
    pub name: String,
    pub generating_rule: String,
}

#[derive(Debug, Deserialize)]
pub struct RawPackageGroup {
    pub name: String,
}

/// Read and decode a query result file.
pub fn load_query_file(path: &Path) -> Result<QueryResult> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("decode query result {}", path.display()))
}
