//! Document loaders. The pipeline only needs bytes by relative path and a way
//! to descend into a base directory; where the bytes come from is up to the
//! implementation.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::{Error, Result};

pub trait Loader: Send + Sync {
    /// Directory relative paths are resolved against.
    fn root(&self) -> &Path;

    /// Read the file at `path` (relative to [`Loader::root`] unless absolute).
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    fn is_dir(&self, path: &str) -> bool;

    /// A loader rooted at the directory `path`.
    fn new_at(&self, path: &str) -> Result<Box<dyn Loader>>;

    fn resolve(&self, path: &str) -> PathBuf {
        clean(&self.root().join(path))
    }
}

/// Lexically normalize `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Loader over the local filesystem.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: clean(&root.into()) }
    }
}

impl Loader for FsLoader {
    fn root(&self) -> &Path { &self.root }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        std::fs::read(&full).map_err(|e| Error::io(format!("loading {}: {}", full.display(), e)))
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn new_at(&self, path: &str) -> Result<Box<dyn Loader>> {
        let full = self.resolve(path);
        if !full.is_dir() {
            return Err(Error::io(format!("{} is not a directory", full.display())));
        }
        Ok(Box::new(FsLoader { root: full }))
    }
}

/// In-memory loader keyed by absolute path. Cheap to clone; sub-loaders share
/// the files present when they were created.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    root: PathBuf,
    files: Arc<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: clean(&root.into()), files: Arc::new(BTreeMap::new()) }
    }

    /// Add a file; relative paths are taken from the root.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let full = clean(&self.root.join(path.as_ref()));
        Arc::make_mut(&mut self.files).insert(full, content.into());
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        self.add_file(path, content);
        self
    }
}

impl Loader for MemoryLoader {
    fn root(&self) -> &Path { &self.root }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        self.files
            .get(&full)
            .cloned()
            .ok_or_else(|| Error::io(format!("loading {}: no such file", full.display())))
    }

    fn is_dir(&self, path: &str) -> bool {
        let full = self.resolve(path);
        self.files.keys().any(|k| k != &full && k.starts_with(&full))
    }

    fn new_at(&self, path: &str) -> Result<Box<dyn Loader>> {
        if !self.is_dir(path) {
            return Err(Error::io(format!("{} is not a directory", self.resolve(path).display())));
        }
        Ok(Box::new(MemoryLoader { root: self.resolve(path), files: Arc::clone(&self.files) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_resolves_relative_and_parent_paths() {
        let ldr = MemoryLoader::new("/app/overlay")
            .with_file("kustomization.yaml", "resources: []")
            .with_file("../base/kustomization.yaml", "resources: []");
        assert!(ldr.load("kustomization.yaml").is_ok());
        assert!(ldr.is_dir("../base"));
        assert!(!ldr.is_dir("kustomization.yaml"));
        let base = ldr.new_at("../base").unwrap();
        assert_eq!(base.root(), Path::new("/app/base"));
        assert_eq!(base.load("kustomization.yaml").unwrap(), b"resources: []");
        assert!(ldr.new_at("missing").is_err());
    }

    #[test]
    fn fs_loader_reads_files_and_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("base")).unwrap();
        std::fs::write(dir.path().join("base/a.yaml"), "x: 1").unwrap();
        let ldr = FsLoader::new(dir.path());
        assert!(ldr.is_dir("base"));
        assert_eq!(ldr.load("base/a.yaml").unwrap(), b"x: 1");
        let sub = ldr.new_at("base").unwrap();
        assert_eq!(sub.load("a.yaml").unwrap(), b"x: 1");
        let err = ldr.load("nope.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
