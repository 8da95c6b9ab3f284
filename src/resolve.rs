//! Source file location resolution with an existence-check cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps a source file's declared location and label to a real path under the
/// workspace root, remembering which paths were already checked on disk.
///
/// The cache is an optimization only: a confirmed path or a not-found sentinel
/// per resolved path, populated lazily. Content reading is deliberately not
/// done here so path resolution and hashing stay independently testable.
#[derive(Debug)]
pub struct SourceResolver {
    root: PathBuf,
    cache: HashMap<PathBuf, Option<PathBuf>>,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SourceResolver {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    /// The on-disk path a source file would occupy: the directory of its build
    /// declaration joined with the file name carried by the label.
    pub fn combined_path(&self, name: &str, location: &str) -> PathBuf {
        let declared = location.split(':').next().unwrap_or("");
        let path_to_target = Path::new(declared).parent().unwrap_or_else(|| Path::new(""));
        let stripped = name.strip_prefix("//").unwrap_or(name);
        let path_from_target = stripped.rsplit(':').next().unwrap_or(stripped);
        self.root.join(path_to_target).join(path_from_target)
    }

    /// Resolve a source file to an existing on-disk path, or `None` when the
    /// file does not exist. The answer is cached either way.
    pub fn resolve(&mut self, name: &str, location: &str) -> Option<PathBuf> {
        let combined = self.combined_path(name, location);
        if let Some(cached) = self.cache.get(&combined) {
            return cached.clone();
        }
        let resolved = if combined.exists() {
            Some(combined.clone())
        } else {
            tracing::warn!(
                path = %combined.display(),
                label = name,
                location,
                "source file does not exist on disk"
            );
            None
        };
        self.cache.insert(combined, resolved.clone());
        resolved
    }
}
