//! Source provider abstraction for filesystem-independent loading.
//!
//! Every read, existence test and directory listing performed while parsing
//! or resolving a model goes through [`SourceProvider`], so the whole model
//! can be held in memory for tests.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

/// Trait that abstracts file I/O for control-file loading.
///
/// The default [`FileSystemProvider`] delegates to `std::fs`;
/// [`InMemoryProvider`] serves a fixed map of paths to text.
pub trait SourceProvider: Send + Sync {
    /// Read the text content of a file.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Whether a file (or directory) exists.
    fn exists(&self, path: &Path) -> bool;

    /// List the direct children of a directory (files and folders), sorted.
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error>;

    /// Canonicalize a path for cycle detection and cache keys.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error>;
}

/// Default filesystem-backed source provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        // Control files written on Windows are often not valid UTF-8.
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            out.push(entry?.path());
        }
        out.sort();
        Ok(out)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        path.canonicalize()
    }
}

/// In-memory source provider for testing and embedding.
///
/// Maps paths to source text strings. Canonicalization normalizes the path
/// without requiring filesystem access.
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    /// Create a new in-memory provider from a map of paths to source text.
    pub fn new(files: HashMap<PathBuf, String>) -> Self {
        let files = files
            .into_iter()
            .map(|(p, s)| (normalize_path(&p), s))
            .collect();
        Self { files }
    }

    /// Convenience constructor from `(path, text)` pairs.
    pub fn from_pairs<I, P, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(p, s)| (p.into(), s.into()))
                .collect(),
        )
    }
}

/// Normalize a path by resolving `.` and `..` components without
/// touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            other => components.push(other),
        }
    }
    components.iter().collect()
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = normalize_path(path);
        self.files.get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = normalize_path(path);
        self.files.contains_key(&normalized)
            || self
                .files
                .keys()
                .any(|k| k.starts_with(&normalized) && k != &normalized)
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let dir = normalize_path(dir);
        let mut out = BTreeSet::new();
        for key in self.files.keys() {
            if let Ok(rest) = key.strip_prefix(&dir) {
                if let Some(first) = rest.components().next() {
                    out.insert(dir.join(first.as_os_str()));
                }
            }
        }
        if out.is_empty() && !self.exists(&dir) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory not found in memory: {}", dir.display()),
            ));
        }
        Ok(out.into_iter().collect())
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        let normalized = normalize_path(path);
        if self.exists(&normalized) {
            Ok(normalized)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "path not found in memory provider: {}",
                    normalized.display()
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(normalize_path(p), PathBuf::from("/a/c/d"));
    }

    #[test]
    fn in_memory_read_source_found() {
        let provider = InMemoryProvider::from_pairs([("/m/test.tcf", "Hardware == GPU")]);
        let content = provider.read_source(Path::new("/m/test.tcf")).unwrap();
        assert_eq!(content, "Hardware == GPU");
    }

    #[test]
    fn in_memory_read_source_not_found() {
        let provider = InMemoryProvider::new(HashMap::new());
        let err = provider
            .read_source(Path::new("/missing.tcf"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn in_memory_list_dir_returns_files_and_folders() {
        let provider = InMemoryProvider::from_pairs([
            ("/m/model/a.tgc", ""),
            ("/m/model/gis/2d_code.shp", ""),
            ("/m/other.txt", ""),
        ]);
        let listed = provider.list_dir(Path::new("/m/model")).unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("/m/model/a.tgc"), PathBuf::from("/m/model/gis")]
        );
    }

    #[test]
    fn in_memory_exists_for_directory_prefix() {
        let provider = InMemoryProvider::from_pairs([("/root/test.tcf", "")]);
        assert!(provider.exists(Path::new("/root")));
        assert!(!provider.exists(Path::new("/nope")));
    }

    #[test]
    fn in_memory_canonicalize_missing_returns_error() {
        let provider = InMemoryProvider::new(HashMap::new());
        let err = provider
            .canonicalize(Path::new("/nonexistent"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
