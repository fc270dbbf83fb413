//! Component source loading.
//!
//! Paths handed to a loader are already normalized and relative to the
//! loader's root (see `resolve_path`).

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("component not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

pub trait Loader {
    fn load(&self, path: &Path) -> Result<String, LoadError>;
}

/// Reads components from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Loader for FsLoader {
    fn load(&self, path: &Path) -> Result<String, LoadError> {
        let full = self.root.join(path);
        fs::read_to_string(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound {
                path: path.to_path_buf(),
            },
            _ => LoadError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })
    }
}

/// In-memory component table, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, source: &str) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: &str, source: &str) {
        self.files
            .insert(resolve_path(Path::new(""), path), source.to_string());
    }
}

impl Loader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<String, LoadError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                path: path.to_path_buf(),
            })
    }
}

/// Resolves `target` against the directory of the referencing component.
///
/// Absolute targets are anchored at the loader root. `..` segments are
/// applied lexically and never climb above the root.
pub fn resolve_path(base_dir: &Path, target: &str) -> PathBuf {
    let target_path = Path::new(target);
    let mut parts: Vec<String> = Vec::new();

    if !target_path.has_root() {
        push_components(base_dir, &mut parts);
    }
    push_components(target_path, &mut parts);

    parts.iter().collect()
}

fn push_components(path: &Path, parts: &mut Vec<String>) {
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_component_dir() {
        assert_eq!(
            resolve_path(Path::new("views"), "./components/card.html"),
            PathBuf::from("views/components/card.html")
        );
        assert_eq!(
            resolve_path(Path::new("views/pages"), "../shared/nav.html"),
            PathBuf::from("views/shared/nav.html")
        );
    }

    #[test]
    fn test_resolve_absolute_is_root_anchored() {
        assert_eq!(
            resolve_path(Path::new("views/pages"), "/views/card.html"),
            PathBuf::from("views/card.html")
        );
    }

    #[test]
    fn test_resolve_never_escapes_root() {
        assert_eq!(
            resolve_path(Path::new("views"), "../../../etc/passwd"),
            PathBuf::from("etc/passwd")
        );
    }

    #[test]
    fn test_memory_loader_normalizes_keys() {
        let loader = MemoryLoader::new().with("./views/home.html", "<p>hi</p>");
        assert_eq!(
            loader.load(Path::new("views/home.html")).unwrap(),
            "<p>hi</p>"
        );
        assert_eq!(
            loader.load(Path::new("views/missing.html")),
            Err(LoadError::NotFound {
                path: PathBuf::from("views/missing.html")
            })
        );
    }
}
