use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed {action} {}: {source}", .path.display())]
pub struct PersistenceError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Plain UTF-8 text storage addressed by layout-relative paths.
pub trait ArtifactStore {
    fn write_text(&self, rel: &Path, contents: &str) -> Result<(), PersistenceError>;
    fn read_text(&self, rel: &Path) -> Result<String, PersistenceError>;
    /// Raw contents, for callers that tolerate invalid UTF-8.
    fn read_bytes(&self, rel: &Path) -> Result<Vec<u8>, PersistenceError>;
    fn exists(&self, rel: &Path) -> bool;
    /// Lists file names directly under `rel_dir`, sorted.
    fn list(&self, rel_dir: &Path) -> Result<Vec<String>, PersistenceError>;
    /// Where `rel` lives, for executing or reporting it.
    fn location(&self, rel: &Path) -> PathBuf;
}

/// Files under a root directory; parents are created on demand.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write_text(&self, rel: &Path, contents: &str) -> Result<(), PersistenceError> {
        let path = self.location(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError {
                action: "creating directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, contents).map_err(|source| PersistenceError {
            action: "writing",
            path,
            source,
        })
    }

    fn read_text(&self, rel: &Path) -> Result<String, PersistenceError> {
        let path = self.location(rel);
        fs::read_to_string(&path).map_err(|source| PersistenceError {
            action: "reading",
            path,
            source,
        })
    }

    fn read_bytes(&self, rel: &Path) -> Result<Vec<u8>, PersistenceError> {
        let path = self.location(rel);
        fs::read(&path).map_err(|source| PersistenceError {
            action: "reading",
            path,
            source,
        })
    }

    fn exists(&self, rel: &Path) -> bool {
        self.location(rel).is_file()
    }

    fn list(&self, rel_dir: &Path) -> Result<Vec<String>, PersistenceError> {
        let dir = self.location(rel_dir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| PersistenceError {
            action: "listing",
            path: dir.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PersistenceError {
                action: "listing",
                path: dir.clone(),
                source,
            })?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            return rel.to_path_buf();
        }
        self.root.join(rel)
    }
}

/// In-process store, used where nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: RefCell<BTreeMap<PathBuf, String>>,
    read_only: bool,
}

impl MemoryArtifactStore {
    /// A store whose writes all fail, for exercising persistence errors.
    pub fn read_only() -> Self {
        Self {
            files: RefCell::default(),
            read_only: true,
        }
    }

    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        self.files.borrow().clone()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write_text(&self, rel: &Path, contents: &str) -> Result<(), PersistenceError> {
        if self.read_only {
            return Err(PersistenceError {
                action: "writing",
                path: rel.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only"),
            });
        }
        self.files
            .borrow_mut()
            .insert(rel.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn read_text(&self, rel: &Path) -> Result<String, PersistenceError> {
        self.files
            .borrow()
            .get(rel)
            .cloned()
            .ok_or_else(|| PersistenceError {
                action: "reading",
                path: rel.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such artifact"),
            })
    }

    fn read_bytes(&self, rel: &Path) -> Result<Vec<u8>, PersistenceError> {
        self.read_text(rel).map(String::into_bytes)
    }

    fn exists(&self, rel: &Path) -> bool {
        self.files.borrow().contains_key(rel)
    }

    fn list(&self, rel_dir: &Path) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|path| path.parent() == Some(rel_dir))
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn location(&self, rel: &Path) -> PathBuf {
        rel.to_path_buf()
    }
}
