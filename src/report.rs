//! Driver-side filtering and report assembly for the two subcommands.
//!
//! The engine digests whatever it is asked for; the choice of which labels to
//! request — rules only, external workspaces excluded — lives here, along with
//! the JSON report shapes.

use crate::digest::{DigestEngine, DigestError};
use crate::graph::{Target, TargetGraph};
use serde::Serialize;

/// One hashed rule in the report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HashedTarget {
    pub label: String,
    pub rule_class: String,
    pub digest: String,
}

#[derive(Debug, Default, Serialize)]
pub struct HashReport {
    pub targets: Vec<HashedTarget>,
}

/// One rule projected onto its declared input labels.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuleInputs {
    pub label: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SourcesReport {
    pub targets: Vec<RuleInputs>,
}

/// External-workspace labels are out of scope for both reports.
fn is_external(label: &str) -> bool {
    label.starts_with('@') || label.starts_with("//external")
}

/// Digest every in-workspace rule in the graph. Output is sorted by label so
/// the report bytes are as deterministic as the digests themselves.
pub fn hash_report(
    graph: &TargetGraph,
    engine: &mut DigestEngine,
) -> Result<HashReport, DigestError> {
    let mut targets = Vec::new();
    for (label, target) in graph.iter() {
        let Target::Rule { rule_class, .. } = target else {
            continue;
        };
        if is_external(label) {
            continue;
        }
        if let Some(digest) = engine.digest(label, graph)? {
            targets.push(HashedTarget {
                label: label.clone(),
                rule_class: rule_class.clone(),
                digest: digest.to_hex(),
            });
        }
    }
    targets.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(HashReport { targets })
}

/// Project each in-workspace rule onto its declared input labels. No hashing.
pub fn sources_report(graph: &TargetGraph) -> SourcesReport {
    let mut targets = Vec::new();
    for (label, target) in graph.iter() {
        let Target::Rule { rule_inputs, .. } = target else {
            continue;
        };
        if is_external(label) {
            continue;
        }
        let inputs = rule_inputs
            .iter()
            .filter(|input| !input.starts_with('@'))
            .cloned()
            .collect();
        targets.push(RuleInputs {
            label: label.clone(),
            inputs,
        });
    }
    targets.sort_by(|a, b| a.label.cmp(&b.label));
    SourcesReport { targets }
}
