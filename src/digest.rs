//! Recursive, memoized digest computation over the target graph.
//!
//! A rule's digest covers its declared attributes (minus build metadata) and
//! the digests of its rule inputs in declared order, bottoming out at source
//! file content hashes. All per-run state lives on [`DigestEngine`]; nothing
//! is shared across runs.

use crate::graph::{Attribute, Label, Target, TargetGraph};
use crate::resolve::SourceResolver;
use sha2::{Digest as _, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Attribute names excluded from hashing: build metadata whose values are
/// path-dependent and must not affect a rule's content identity.
const IGNORED_ATTRIBUTES: [&str; 3] = ["build_file", "generator_location", "path"];

/// Fixed-width content digest for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Digest of the empty input; the terminal value for missing content.
    pub fn of_empty() -> Digest {
        Digest(Sha256::new().finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Digesting failed in a way that invalidates the requested label's result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    /// The label's transitive rule inputs lead back to the label itself.
    #[error("dependency cycle through {label}")]
    Cycle { label: Label },
}

/// Recoverable conditions observed during a traversal.
///
/// Collected on the engine rather than only written to the log stream so
/// callers and tests can assert on them; each is also emitted via `tracing`.
/// Any diagnostic means the corresponding digests cover less than the full
/// declared input set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A requested label is absent from the graph.
    MissingTarget { label: Label },
    /// A rule input points at a label absent from the graph; the input
    /// contributes nothing to the rule's digest.
    DanglingInput { rule: Label, input: Label },
    /// A source file's resolved path does not exist; it digests as empty content.
    MissingSourceFile { label: Label, path: PathBuf },
    /// A source file exists but could not be read; it digests as empty content.
    UnreadableSourceFile { label: Label, path: PathBuf },
    /// PackageGroup targets are not hash-bearing; no digest is produced.
    UnsupportedKind { label: Label },
    /// A generated file's generating rule is absent from the graph.
    MissingGeneratingRule {
        label: Label,
        generating_rule: Label,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingTarget { label } => {
                write!(f, "{label} not found in target graph")
            }
            Diagnostic::DanglingInput { rule, input } => {
                write!(f, "{input} not found in target graph (input of {rule})")
            }
            Diagnostic::MissingSourceFile { label, path } => {
                write!(f, "{label} does not exist on disk at {}", path.display())
            }
            Diagnostic::UnreadableSourceFile { label, path } => {
                write!(f, "failed to read {label} at {}", path.display())
            }
            Diagnostic::UnsupportedKind { label } => {
                write!(f, "skipped unsupported target {label}")
            }
            Diagnostic::MissingGeneratingRule {
                label,
                generating_rule,
            } => {
                write!(
                    f,
                    "generating rule {generating_rule} of {label} not found in target graph"
                )
            }
        }
    }
}

/// Counters exposed for run summaries and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    /// Source file content reads from disk. Memoization keeps this at one per
    /// source file label per run, however many rules depend on it.
    pub file_reads: usize,
}

/// Memoized digest computation, state scoped to one run.
///
/// The digest cache is keyed by label value, so two requests for the same
/// label within a run always observe one computation. The visiting set holds
/// the labels on the current recursion stack and turns a dependency cycle
/// into [`DigestError::Cycle`] instead of unbounded recursion.
#[derive(Debug)]
pub struct DigestEngine {
    cache: HashMap<Label, Digest>,
    visiting: HashSet<Label>,
    resolver: SourceResolver,
    diagnostics: Vec<Diagnostic>,
    stats: EngineStats,
}

impl DigestEngine {
    /// Engine rooted at `workspace` for source file resolution.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        DigestEngine {
            cache: HashMap::new(),
            visiting: HashSet::new(),
            resolver: SourceResolver::new(workspace),
            diagnostics: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The memoized digest for a label, if one has been computed this run.
    pub fn cached(&self, label: &str) -> Option<Digest> {
        self.cache.get(label).copied()
    }

    /// Digest one target by label.
    ///
    /// `Ok(None)` means the label carries no digest: it is absent from the
    /// graph or names a PackageGroup. Both cases leave a [`Diagnostic`] behind
    /// and cache nothing.
    pub fn digest(
        &mut self,
        label: &str,
        graph: &TargetGraph,
    ) -> Result<Option<Digest>, DigestError> {
        if let Some(cached) = self.cache.get(label) {
            return Ok(Some(*cached));
        }
        if self.visiting.contains(label) {
            return Err(DigestError::Cycle {
                label: label.to_string(),
            });
        }
        let Some(target) = graph.get(label) else {
            self.report(Diagnostic::MissingTarget {
                label: label.to_string(),
            });
            return Ok(None);
        };

        let digest = match target {
            Target::Rule {
                attributes,
                rule_inputs,
                ..
            } => {
                self.visiting.insert(label.to_string());
                let result = self.digest_rule(label, attributes, rule_inputs, graph);
                self.visiting.remove(label);
                result?
            }
            Target::SourceFile { name, location } => self.digest_source_file(name, location),
            Target::GeneratedFile {
                generating_rule, ..
            } => {
                self.visiting.insert(label.to_string());
                let result = self.digest_generated(label, generating_rule, graph);
                self.visiting.remove(label);
                result?
            }
            Target::PackageGroup { .. } => {
                self.report(Diagnostic::UnsupportedKind {
                    label: label.to_string(),
                });
                return Ok(None);
            }
        };
        self.cache.insert(label.to_string(), digest);
        Ok(Some(digest))
    }

    /// Hash the rule's kept attributes in declared order, then fold in each
    /// resolvable input's digest, also in declared order. A dangling input is
    /// skipped outright rather than hashed as a placeholder.
    fn digest_rule(
        &mut self,
        label: &str,
        attributes: &[Attribute],
        rule_inputs: &[Label],
        graph: &TargetGraph,
    ) -> Result<Digest, DigestError> {
        let mut hasher = Sha256::new();
        for attribute in attributes {
            if IGNORED_ATTRIBUTES.contains(&attribute.name.as_str()) {
                continue;
            }
            hasher.update((attribute.name.len() as u64).to_le_bytes());
            hasher.update(attribute.name.as_bytes());
            hasher.update((attribute.value.len() as u64).to_le_bytes());
            hasher.update(&attribute.value);
        }
        for input in rule_inputs {
            if graph.get(input).is_none() {
                self.report(Diagnostic::DanglingInput {
                    rule: label.to_string(),
                    input: input.clone(),
                });
                continue;
            }
            if let Some(dep) = self.digest(input, graph)? {
                hasher.update(dep.as_bytes());
            }
        }
        Ok(Digest(hasher.finalize().into()))
    }

    /// Hash the file's content; a file that cannot be resolved or read digests
    /// as empty content so the traversal stays total.
    fn digest_source_file(&mut self, name: &str, location: &str) -> Digest {
        let Some(path) = self.resolver.resolve(name, location) else {
            let path = self.resolver.combined_path(name, location);
            self.report(Diagnostic::MissingSourceFile {
                label: name.to_string(),
                path,
            });
            return Digest::of_empty();
        };
        self.stats.file_reads += 1;
        match fs::read(&path) {
            Ok(bytes) => Digest(Sha256::digest(bytes).into()),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read source file");
                self.report(Diagnostic::UnreadableSourceFile {
                    label: name.to_string(),
                    path,
                });
                Digest::of_empty()
            }
        }
    }

    /// A generated file's digest is its generating rule's digest; the value is
    /// cached under the generated file's own label by the caller, and under
    /// the rule's label by the inner call.
    fn digest_generated(
        &mut self,
        label: &str,
        generating_rule: &str,
        graph: &TargetGraph,
    ) -> Result<Digest, DigestError> {
        if graph.get(generating_rule).is_none() {
            self.report(Diagnostic::MissingGeneratingRule {
                label: label.to_string(),
                generating_rule: generating_rule.to_string(),
            });
            return Ok(Digest::of_empty());
        }
        match self.digest(generating_rule, graph)? {
            Some(digest) => Ok(digest),
            // The generating target is itself not hash-bearing.
            None => Ok(Digest::of_empty()),
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use tempfile::TempDir;

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute {
            name: name.to_string(),
            value: value.as_bytes().to_vec(),
        }
    }

    fn rule(name: &str, attributes: Vec<Attribute>, inputs: &[&str]) -> Target {
        Target::Rule {
            name: name.to_string(),
            rule_class: "go_library".to_string(),
            attributes,
            rule_inputs: inputs.iter().map(|input| input.to_string()).collect(),
        }
    }

    fn source_file(name: &str, location: &str) -> Target {
        Target::SourceFile {
            name: name.to_string(),
            location: location.to_string(),
        }
    }

    /// Workspace with `pkg/lib.go` on disk plus a graph wiring a rule to it.
    fn workspace_with_source(content: &str) -> (TempDir, TargetGraph) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/lib.go"), content).unwrap();
        let graph = build_graph(vec![
            rule(
                "//pkg:lib",
                vec![attr("srcs", "[\"lib.go\"]")],
                &["//pkg:lib.go"],
            ),
            source_file("//pkg:lib.go", "pkg/BUILD:1:1"),
        ]);
        (dir, graph)
    }

    fn digest_of(engine: &mut DigestEngine, label: &str, graph: &TargetGraph) -> Digest {
        engine.digest(label, graph).unwrap().unwrap()
    }

    #[test]
    fn digests_are_deterministic_across_engines() {
        let (dir, graph) = workspace_with_source("package lib\n");
        let mut first = DigestEngine::new(dir.path());
        let mut second = DigestEngine::new(dir.path());
        assert_eq!(
            digest_of(&mut first, "//pkg:lib", &graph),
            digest_of(&mut second, "//pkg:lib", &graph)
        );
    }

    #[test]
    fn rule_digest_is_reproducible_byte_for_byte() {
        let (dir, graph) = workspace_with_source("package main");
        let mut engine = DigestEngine::new(dir.path());
        let digest = digest_of(&mut engine, "//pkg:lib", &graph);

        let file_hash: [u8; 32] = Sha256::digest("package main").into();
        let mut expected = Sha256::new();
        let name = "srcs";
        let value = "[\"lib.go\"]";
        expected.update((name.len() as u64).to_le_bytes());
        expected.update(name.as_bytes());
        expected.update((value.len() as u64).to_le_bytes());
        expected.update(value.as_bytes());
        expected.update(file_hash);
        let expected: [u8; 32] = expected.finalize().into();
        assert_eq!(digest.as_bytes(), &expected);
    }

    #[test]
    fn memoization_reads_each_source_file_once() {
        // Diamond: top depends on left and right, both depend on one source.
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/lib.go"), "package lib\n").unwrap();
        let graph = build_graph(vec![
            rule("//pkg:top", Vec::new(), &["//pkg:left", "//pkg:right"]),
            rule("//pkg:left", Vec::new(), &["//pkg:lib.go"]),
            rule("//pkg:right", Vec::new(), &["//pkg:lib.go"]),
            source_file("//pkg:lib.go", "pkg/BUILD:1:1"),
        ]);

        let mut engine = DigestEngine::new(dir.path());
        let first = digest_of(&mut engine, "//pkg:top", &graph);
        assert_eq!(engine.stats().file_reads, 1);

        let second = digest_of(&mut engine, "//pkg:top", &graph);
        assert_eq!(first, second);
        assert_eq!(engine.stats().file_reads, 1);
    }

    #[test]
    fn ignored_attributes_do_not_affect_the_digest() {
        let dir = TempDir::new().unwrap();
        let with = |metadata: &str| {
            build_graph(vec![rule(
                "//pkg:lib",
                vec![
                    attr("srcs", "[\"lib.go\"]"),
                    attr("build_file", metadata),
                    attr("generator_location", metadata),
                    attr("path", metadata),
                ],
                &[],
            )])
        };
        let mut engine = DigestEngine::new(dir.path());
        let a = digest_of(&mut engine, "//pkg:lib", &with("/home/a/BUILD"));
        let mut engine = DigestEngine::new(dir.path());
        let b = digest_of(&mut engine, "//pkg:lib", &with("/home/b/BUILD"));
        assert_eq!(a, b);
    }

    #[test]
    fn ordinary_attribute_changes_the_digest() {
        let dir = TempDir::new().unwrap();
        let with = |srcs: &str| build_graph(vec![rule("//pkg:lib", vec![attr("srcs", srcs)], &[])]);
        let mut engine = DigestEngine::new(dir.path());
        let a = digest_of(&mut engine, "//pkg:lib", &with("[\"a.go\"]"));
        let mut engine = DigestEngine::new(dir.path());
        let b = digest_of(&mut engine, "//pkg:lib", &with("[\"b.go\"]"));
        assert_ne!(a, b);
    }

    #[test]
    fn attribute_order_is_significant() {
        let dir = TempDir::new().unwrap();
        let with = |attributes: Vec<Attribute>| {
            build_graph(vec![rule("//pkg:lib", attributes, &[])])
        };
        let mut engine = DigestEngine::new(dir.path());
        let ab = digest_of(
            &mut engine,
            "//pkg:lib",
            &with(vec![attr("a", "1"), attr("b", "2")]),
        );
        let mut engine = DigestEngine::new(dir.path());
        let ba = digest_of(
            &mut engine,
            "//pkg:lib",
            &with(vec![attr("b", "2"), attr("a", "1")]),
        );
        assert_ne!(ab, ba);
    }

    #[test]
    fn dependency_content_change_propagates() {
        let (dir, graph) = workspace_with_source("package lib\n");
        let mut engine = DigestEngine::new(dir.path());
        let before = digest_of(&mut engine, "//pkg:lib", &graph);

        std::fs::write(dir.path().join("pkg/lib.go"), "package lib // v2\n").unwrap();
        let mut engine = DigestEngine::new(dir.path());
        let after = digest_of(&mut engine, "//pkg:lib", &graph);
        assert_ne!(before, after);
    }

    #[test]
    fn dangling_input_is_skipped_not_hashed() {
        let dir = TempDir::new().unwrap();
        let with_dangling = build_graph(vec![rule(
            "//pkg:lib",
            vec![attr("srcs", "[]")],
            &["//pkg:gone"],
        )]);
        let without = build_graph(vec![rule("//pkg:lib", vec![attr("srcs", "[]")], &[])]);

        let mut engine = DigestEngine::new(dir.path());
        let a = digest_of(&mut engine, "//pkg:lib", &with_dangling);
        assert_eq!(
            engine.diagnostics(),
            [Diagnostic::DanglingInput {
                rule: "//pkg:lib".to_string(),
                input: "//pkg:gone".to_string(),
            }]
        );

        let mut engine = DigestEngine::new(dir.path());
        let b = digest_of(&mut engine, "//pkg:lib", &without);
        assert_eq!(a, b);
    }

    #[test]
    fn missing_file_digests_like_an_empty_file() {
        let missing_dir = TempDir::new().unwrap();
        let graph = build_graph(vec![source_file("//pkg:lib.go", "pkg/BUILD:1:1")]);
        let mut engine = DigestEngine::new(missing_dir.path());
        let missing = digest_of(&mut engine, "//pkg:lib.go", &graph);
        assert_eq!(missing, Digest::of_empty());
        assert!(matches!(
            engine.diagnostics(),
            [Diagnostic::MissingSourceFile { .. }]
        ));

        let (empty_dir, graph) = workspace_with_source("");
        let mut engine = DigestEngine::new(empty_dir.path());
        let empty = digest_of(&mut engine, "//pkg:lib.go", &graph);
        assert_eq!(missing, empty);
        assert!(engine.diagnostics().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_digests_as_empty_content() {
        // A directory where a file is expected: exists, but read fails.
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg/lib.go")).unwrap();
        let graph = build_graph(vec![source_file("//pkg:lib.go", "pkg/BUILD:1:1")]);
        let mut engine = DigestEngine::new(dir.path());
        let digest = digest_of(&mut engine, "//pkg:lib.go", &graph);
        assert_eq!(digest, Digest::of_empty());
        assert!(matches!(
            engine.diagnostics(),
            [Diagnostic::UnreadableSourceFile { .. }]
        ));
    }

    #[test]
    fn generated_file_passes_through_its_generating_rule() {
        let dir = TempDir::new().unwrap();
        let graph = build_graph(vec![
            rule("//pkg:gen", vec![attr("cmd", "\"touch $@\"")], &[]),
            Target::GeneratedFile {
                name: "//pkg:out.txt".to_string(),
                generating_rule: "//pkg:gen".to_string(),
            },
        ]);
        let mut engine = DigestEngine::new(dir.path());
        let generated = digest_of(&mut engine, "//pkg:out.txt", &graph);

        // One request populated both labels, each carrying the same value.
        assert_eq!(engine.cached("//pkg:out.txt"), Some(generated));
        assert_eq!(engine.cached("//pkg:gen"), Some(generated));
        assert_eq!(digest_of(&mut engine, "//pkg:gen", &graph), generated);
    }

    #[test]
    fn package_group_yields_no_digest() {
        let dir = TempDir::new().unwrap();
        let graph = build_graph(vec![Target::PackageGroup {
            name: "//pkg:visibility".to_string(),
        }]);
        let mut engine = DigestEngine::new(dir.path());
        assert_eq!(engine.digest("//pkg:visibility", &graph), Ok(None));
        assert_eq!(engine.cached("//pkg:visibility"), None);
        assert_eq!(
            engine.diagnostics(),
            [Diagnostic::UnsupportedKind {
                label: "//pkg:visibility".to_string(),
            }]
        );
    }

    #[test]
    fn missing_label_yields_no_digest() {
        let dir = TempDir::new().unwrap();
        let graph = build_graph(Vec::new());
        let mut engine = DigestEngine::new(dir.path());
        assert_eq!(engine.digest("//pkg:nope", &graph), Ok(None));
        assert_eq!(
            engine.diagnostics(),
            [Diagnostic::MissingTarget {
                label: "//pkg:nope".to_string(),
            }]
        );
    }

    #[test]
    fn package_group_input_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        let with_group = build_graph(vec![
            rule("//pkg:lib", vec![attr("srcs", "[]")], &["//pkg:visibility"]),
            Target::PackageGroup {
                name: "//pkg:visibility".to_string(),
            },
        ]);
        let without = build_graph(vec![rule("//pkg:lib", vec![attr("srcs", "[]")], &[])]);
        let mut engine = DigestEngine::new(dir.path());
        let a = digest_of(&mut engine, "//pkg:lib", &with_group);
        let mut engine = DigestEngine::new(dir.path());
        let b = digest_of(&mut engine, "//pkg:lib", &without);
        assert_eq!(a, b);
    }

    #[test]
    fn cycle_is_detected_not_overflowed() {
        let dir = TempDir::new().unwrap();
        let graph = build_graph(vec![
            rule("//pkg:a", Vec::new(), &["//pkg:b"]),
            rule("//pkg:b", Vec::new(), &["//pkg:a"]),
        ]);
        let mut engine = DigestEngine::new(dir.path());
        assert_eq!(
            engine.digest("//pkg:a", &graph),
            Err(DigestError::Cycle {
                label: "//pkg:a".to_string(),
            })
        );
    }
}
