use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {0} rejected")]
    Rejected(String),
}

/// Receives each exported tile. Stands in for the browser download.
pub trait ArtifactSink: Send + Sync + 'static {
    fn deliver(&self, name: &str, png: &[u8]) -> Result<(), SinkError>;
}

/// Writes tiles as files under one directory.
#[derive(Clone, Debug)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    /// Creates `dir` if it doesn't exist.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Io { path: dir.clone(), source })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirSink {
    fn deliver(&self, name: &str, png: &[u8]) -> Result<(), SinkError> {
        let path = self.dir.join(name);
        std::fs::write(&path, png).map_err(|source| SinkError::Io { path, source })
    }
}

/// Collects tiles in memory, in delivery order.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.lock())
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Vec<u8>)>> {
        // A panic mid-push leaves the vec intact, so poisoning is ignored.
        self.artifacts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ArtifactSink for MemorySink {
    fn deliver(&self, name: &str, png: &[u8]) -> Result<(), SinkError> {
        self.lock().push((name.to_string(), png.to_vec()));
        Ok(())
    }
}
