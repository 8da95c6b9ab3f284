//! Target graph model and the label-keyed index over it.

use crate::query::{QueryResult, RawTarget, TargetKind};
use std::collections::HashMap;
use thiserror::Error;

/// Opaque, globally unique target identifier, e.g. `//pkg:name`.
pub type Label = String;

/// A rule attribute as declared: name plus the canonical serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Vec<u8>,
}

/// One node in the build graph.
#[derive(Debug, Clone)]
pub enum Target {
    Rule {
        name: Label,
        rule_class: String,
        attributes: Vec<Attribute>,
        rule_inputs: Vec<Label>,
    },
    SourceFile {
        name: Label,
        /// `<path>:<line>:<col>` of the file's build declaration.
        location: String,
    },
    GeneratedFile {
        name: Label,
        generating_rule: Label,
    },
    /// Not hash-bearing; excluded from digest computation.
    PackageGroup { name: Label },
}

/// Structural errors that make the graph model untrustworthy. Unlike the
/// recoverable diagnostics in [`crate::digest`], these abort the run.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unrecognized target kind in query result")]
    UnrecognizedKind,
    #[error("target is missing its {kind} payload")]
    MissingPayload { kind: &'static str },
    #[error("failed to serialize attribute {name:?}")]
    Attribute {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Target {
    /// Convert a decoded wire target into the typed model.
    pub fn from_raw(raw: RawTarget) -> Result<Target, GraphError> {
        match raw.kind {
            TargetKind::Rule => {
                let rule = raw.rule.ok_or(GraphError::MissingPayload { kind: "rule" })?;
                let mut attributes = Vec::with_capacity(rule.attribute.len());
                for attribute in rule.attribute {
                    let name = attribute.name.clone();
                    let (name, value) = attribute
                        .canonical_bytes()
                        .map_err(|source| GraphError::Attribute { name, source })?;
                    attributes.push(Attribute { name, value });
                }
                Ok(Target::Rule {
                    name: rule.name,
                    rule_class: rule.rule_class,
                    attributes,
                    rule_inputs: rule.rule_input,
                })
            }
            TargetKind::SourceFile => {
                let source = raw.source_file.ok_or(GraphError::MissingPayload {
                    kind: "source file",
                })?;
                Ok(Target::SourceFile {
                    name: source.name,
                    location: source.location,
                })
            }
            TargetKind::GeneratedFile => {
                let generated = raw.generated_file.ok_or(GraphError::MissingPayload {
                    kind: "generated file",
                })?;
                Ok(Target::GeneratedFile {
                    name: generated.name,
                    generating_rule: generated.generating_rule,
                })
            }
            TargetKind::PackageGroup => {
                let group = raw.package_group.ok_or(GraphError::MissingPayload {
                    kind: "package group",
                })?;
                Ok(Target::PackageGroup { name: group.name })
            }
            TargetKind::Unrecognized => Err(GraphError::UnrecognizedKind),
        }
    }
}

/// The identity key of a target, by kind.
pub fn label_of(target: &Target) -> &Label {
    match target {
        Target::Rule { name, .. }
        | Target::SourceFile { name, .. }
        | Target::GeneratedFile { name, .. }
        | Target::PackageGroup { name } => name,
    }
}

/// Label-indexed snapshot of one query result. Built once, read-only while
/// digests are computed over it.
#[derive(Debug, Default)]
pub struct TargetGraph {
    targets: HashMap<Label, Target>,
}

impl TargetGraph {
    /// Decode a full query result into a graph. Fails on the first target
    /// whose kind is unrecognized or whose payload is malformed.
    pub fn from_query(result: QueryResult) -> Result<TargetGraph, GraphError> {
        let targets = result
            .target
            .into_iter()
            .map(Target::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(build_graph(targets))
    }

    pub fn get(&self, label: &str) -> Option<&Target> {
        self.targets.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Target)> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Index targets by label. Referential integrity is not checked here; dangling
/// rule inputs surface lazily during digesting. A duplicate label silently
/// replaces the earlier occurrence.
pub fn build_graph(targets: Vec<Target>) -> TargetGraph {
    let mut map = HashMap::with_capacity(targets.len());
    for target in targets {
        map.insert(label_of(&target).clone(), target);
    }
    TargetGraph { targets: map }
}
