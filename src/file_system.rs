//! Partial loaders used by `include` and `render`.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{Error, ErrorKind, Result};

pub trait FileSystem: fmt::Debug + Send + Sync {
    /// Source text of the partial at `path`.
    fn read_template_file(&self, path: &str) -> Result<String>;
}

/// Refuses every lookup. The default for a new registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankFileSystem;

impl FileSystem for BlankFileSystem {
    fn read_template_file(&self, _path: &str) -> Result<String> {
        Err(Error::new(
            ErrorKind::FileSystem,
            "This liquid context does not allow includes.",
        ))
    }
}

/// Partials held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: FxHashMap<String, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_template_file(&self, path: &str) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            Error::new(ErrorKind::FileSystem, format!("No such template '{path}'"))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryFileSystem {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
