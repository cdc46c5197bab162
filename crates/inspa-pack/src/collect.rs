//! File collection for the builder.
//!
//! Walks the configured input roots in deterministic order, applies glob
//! exclusion rules, and produces the ordered manifest that fixes the
//! physical order of files in the payload.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use glob::Pattern;
use tracing::debug;

use crate::config::InputSpec;
use crate::format::FileEntry;
use crate::{PackError, Result};

/// One file of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Relative path under the install tree, forward slashes.
    pub logical_path: String,
    /// Absolute source path on the build machine.
    pub source_path: PathBuf,
    /// File size in bytes at collection time.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

/// Ordered list of files making up the payload.
///
/// The serialization order is the physical order in the payload stream.
#[derive(Debug, Clone, Default)]
pub struct FileManifest {
    entries: Vec<ManifestEntry>,
}

impl FileManifest {
    /// Entries in payload order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest holds no files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total uncompressed size of all files.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Header file list in manifest order.
    pub fn to_file_entries(&self) -> Vec<FileEntry> {
        self.entries
            .iter()
            .map(|e| FileEntry {
                path: e.logical_path.clone(),
                size: e.size,
                mtime: e.mtime,
            })
            .collect()
    }
}

/// A compiled exclusion rule.
///
/// Trailing `/` marks a directory rule: it excludes the matched directory
/// and everything below it.
struct ExcludeRule {
    pattern: Pattern,
    dir_only: bool,
}

impl ExcludeRule {
    fn compile(raw: &str) -> Result<Self> {
        let normalized = raw.replace('\\', "/");
        let (body, dir_only) = match normalized.strip_suffix('/') {
            Some(body) => (body, true),
            None => (normalized.as_str(), false),
        };
        let pattern = Pattern::new(body)
            .map_err(|e| PackError::ConfigInvalid(format!("bad exclude pattern {raw:?}: {e}")))?;
        Ok(Self { pattern, dir_only })
    }

    fn matches(&self, logical_path: &str) -> bool {
        if self.pattern.matches(logical_path) {
            return true;
        }
        if self.dir_only {
            // Match the rule against every directory prefix of the path, so
            // "cache/" also excludes "a/cache/f.txt".
            let mut prefix = String::new();
            for component in logical_path.split('/') {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(component);
                if self.pattern.matches(&prefix) || self.pattern.matches(component) {
                    return true;
                }
            }
        }
        false
    }
}

/// Collects files from input roots into a [`FileManifest`].
pub struct FileCollector {
    rules: Vec<ExcludeRule>,
    /// Canonicalized input roots; symlinked directories outside these are
    /// not traversed.
    roots: Vec<PathBuf>,
    /// Canonicalized directories already visited, for cycle detection.
    visited: HashSet<PathBuf>,
    seen_logical: HashSet<String>,
    entries: Vec<ManifestEntry>,
}

impl FileCollector {
    /// Create a collector with the given exclusion patterns.
    pub fn new(exclude: &[String]) -> Result<Self> {
        let rules = exclude
            .iter()
            .map(|p| ExcludeRule::compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            roots: Vec::new(),
            visited: HashSet::new(),
            seen_logical: HashSet::new(),
            entries: Vec::new(),
        })
    }

    /// Walk every input root and produce the manifest.
    pub fn collect(mut self, inputs: &[InputSpec]) -> Result<FileManifest> {
        for input in inputs {
            if !input.path.exists() {
                return Err(PackError::InputNotFound(input.path.clone()));
            }
            self.roots.push(fs::canonicalize(&input.path)?);
        }

        for input in inputs {
            let root = fs::canonicalize(&input.path)?;
            if root.is_file() {
                let logical = file_name_of(&root)?;
                if !self.is_excluded(&logical) {
                    self.push_file(&root, logical)?;
                }
            } else {
                let prefix = if input.preserve_structure {
                    file_name_of(&root)?
                } else {
                    String::new()
                };
                self.visited.insert(root.clone());
                self.walk_dir(&root, &prefix, input.recursive)?;
            }
        }

        debug!(
            files = self.entries.len(),
            total_size = self.entries.iter().map(|e| e.size).sum::<u64>(),
            "collection complete"
        );

        Ok(FileManifest {
            entries: self.entries,
        })
    }

    /// Walk one directory level in sorted order.
    fn walk_dir(&mut self, dir: &Path, prefix: &str, recursive: bool) -> Result<()> {
        let mut children: Vec<PathBuf> = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        children.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

        for child in children {
            let name = file_name_of(&child)?;
            let logical = join_logical(prefix, &name);

            // Resolve symlinks before classifying; a dangling link is an
            // I/O error the same way an unreadable file is.
            let resolved = fs::canonicalize(&child)?;

            if resolved.is_dir() {
                if !recursive {
                    continue;
                }
                if !self.roots.iter().any(|root| resolved.starts_with(root)) {
                    debug!(path = %child.display(), "skipping link outside input roots");
                    continue;
                }
                if !self.visited.insert(resolved.clone()) {
                    debug!(path = %child.display(), "skipping directory cycle");
                    continue;
                }
                self.walk_dir(&resolved, &logical, recursive)?;
            } else if !self.is_excluded(&logical) {
                self.push_file(&resolved, logical)?;
            }
        }
        Ok(())
    }

    fn push_file(&mut self, source: &Path, logical: String) -> Result<()> {
        if !self.seen_logical.insert(logical.clone()) {
            return Err(PackError::DuplicateLogicalPath(logical));
        }

        let meta = fs::metadata(source)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        self.entries.push(ManifestEntry {
            logical_path: logical,
            source_path: source.to_path_buf(),
            size: meta.len(),
            mtime,
        });
        Ok(())
    }

    fn is_excluded(&self, logical_path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(logical_path))
    }
}

/// Collect a manifest from the given inputs and exclusion patterns.
pub fn collect_files(inputs: &[InputSpec], exclude: &[String]) -> Result<FileManifest> {
    FileCollector::new(exclude)?.collect(inputs)
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PackError::InputNotFound(path.to_path_buf()))
}

fn join_logical(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_file(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().write_all(content).unwrap();
    }

    fn input(path: &Path, preserve: bool) -> InputSpec {
        InputSpec {
            path: path.to_path_buf(),
            recursive: true,
            preserve_structure: preserve,
        }
    }

    #[test]
    fn test_collect_is_sorted_and_deterministic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("zeta.txt"), b"z");
        write_file(&root.join("alpha.txt"), b"a");
        write_file(&root.join("sub/inner.txt"), b"i");

        let manifest = collect_files(&[input(&root, false)], &[]).unwrap();
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.logical_path.as_str())
            .collect();
        assert_eq!(paths, ["alpha.txt", "sub/inner.txt", "zeta.txt"]);

        let again = collect_files(&[input(&root, false)], &[]).unwrap();
        assert_eq!(manifest.entries(), again.entries());
    }

    #[test]
    fn test_preserve_structure_prefixes_root_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("bin/tool.exe"), b"x");

        let manifest = collect_files(&[input(&root, true)], &[]).unwrap();
        assert_eq!(manifest.entries()[0].logical_path, "app/bin/tool.exe");
    }

    #[test]
    fn test_single_file_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("readme.txt");
        write_file(&file, b"hello\n");

        let manifest = collect_files(&[input(&file, true)], &[]).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.entries()[0].logical_path, "readme.txt");
        assert_eq!(manifest.entries()[0].size, 6);
    }

    #[test]
    fn test_exclusion_patterns() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("keep.txt"), b"k");
        write_file(&root.join("debug.pdb"), b"p");
        write_file(&root.join("sub/nested.pdb"), b"p");
        write_file(&root.join("cache/blob.bin"), b"c");
        write_file(&root.join("sub/cache/deep.bin"), b"c");

        let exclude = vec!["*.pdb".to_string(), "cache/".to_string()];
        let manifest = collect_files(&[input(&root, false)], &exclude).unwrap();
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.logical_path.as_str())
            .collect();
        assert_eq!(paths, ["keep.txt"]);
    }

    #[test]
    fn test_exclude_everything_yields_empty_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("a.txt"), b"a");
        write_file(&root.join("b/c.txt"), b"c");

        let manifest = collect_files(&[input(&root, false)], &["*".to_string()]).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.total_size(), 0);
    }

    #[test]
    fn test_duplicate_logical_path_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        write_file(&a.join("same.txt"), b"1");
        write_file(&b.join("same.txt"), b"2");

        // Both roots flattened: both files claim "same.txt".
        let result = collect_files(&[input(&a, false), input(&b, false)], &[]);
        assert!(matches!(
            result,
            Err(PackError::DuplicateLogicalPath(p)) if p == "same.txt"
        ));
    }

    #[test]
    fn test_missing_input_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope");
        let result = collect_files(&[input(&missing, true)], &[]);
        assert!(matches!(result, Err(PackError::InputNotFound(_))));
    }

    #[test]
    fn test_non_recursive_takes_direct_children_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("top.txt"), b"t");
        write_file(&root.join("sub/deep.txt"), b"d");

        let spec = InputSpec {
            path: root.clone(),
            recursive: false,
            preserve_structure: false,
        };
        let manifest = collect_files(&[spec], &[]).unwrap();
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.logical_path.as_str())
            .collect();
        assert_eq!(paths, ["top.txt"]);
    }

    #[test]
    fn test_non_ascii_names_survive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("数据/说明.txt"), b"docs");

        let manifest = collect_files(&[input(&root, false)], &[]).unwrap();
        assert_eq!(manifest.entries()[0].logical_path, "数据/说明.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_detected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        write_file(&root.join("file.txt"), b"f");
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        let manifest = collect_files(&[input(&root, false)], &[]).unwrap();
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.logical_path.as_str())
            .collect();
        assert_eq!(paths, ["file.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_roots_not_traversed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("app");
        let outside = temp_dir.path().join("outside");
        write_file(&root.join("file.txt"), b"f");
        write_file(&outside.join("secret.txt"), b"s");
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let manifest = collect_files(&[input(&root, false)], &[]).unwrap();
        let paths: Vec<_> = manifest
            .entries()
            .iter()
            .map(|e| e.logical_path.as_str())
            .collect();
        assert_eq!(paths, ["file.txt"]);
    }
}
