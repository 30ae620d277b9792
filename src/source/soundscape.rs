//! Soundscape Storage
//!
//! Atmosphere recordings are looked up by id and fetched just in time.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ReverieError;
use crate::source::fetch::FetchFuture;

/// Provides encoded soundscape audio by id
pub trait SoundscapeStore: Send + Sync {
    fn load<'a>(&'a self, id: &'a str) -> FetchFuture<'a>;
}

/// Soundscapes stored as `<root>/<id>.wav`
#[derive(Debug, Clone)]
pub struct DirectorySoundscapes {
    root: PathBuf,
}

impl DirectorySoundscapes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        // Ids are plain names, never paths
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return None;
        }
        Some(self.root.join(format!("{}.wav", id)))
    }

    /// Ids of every soundscape in the directory, sorted
    pub fn available(&self) -> Vec<String> {
        let mut ids: Vec<String> = WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .collect();
        ids.sort();
        ids
    }
}

impl SoundscapeStore for DirectorySoundscapes {
    fn load<'a>(&'a self, id: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let path = self
                .path_for(id)
                .ok_or_else(|| ReverieError::fetch(id, "invalid soundscape id"))?;
            tokio::fs::read(&path)
                .await
                .map_err(|e| ReverieError::fetch(id, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_directory_lists_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rain.wav"), b"RIFF").unwrap();
        std::fs::write(dir.path().join("forest.WAV"), b"RIFF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let store = DirectorySoundscapes::new(dir.path());
        assert_eq!(store.available(), vec!["forest".to_string(), "rain".to_string()]);
        assert_eq!(store.load("rain").await.unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn test_rejects_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectorySoundscapes::new(dir.path());
        assert!(store.load("../secret").await.is_err());
        assert!(store.load("").await.is_err());
        assert!(store.load("missing").await.is_err());
    }
}
