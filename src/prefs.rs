//! User Preferences
//!
//! Opaque key/value storage for settings that outlive a session, such as
//! per-layer volume.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::segment::LayerName;

/// Key a layer's volume preference is stored under
pub fn volume_key(layer: LayerName) -> String {
    format!("volume.{}", layer)
}

/// Key/value preference storage
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<f32>;
    fn set(&self, key: &str, value: f32) -> Result<()>;
}

/// Preferences kept only for the life of the process
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, f32>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<f32> {
        self.values.lock().ok()?.get(key).copied()
    }

    fn set(&self, key: &str, value: f32) -> Result<()> {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// Preferences persisted as a flat JSON object
///
/// The file is read once on open and rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, f32>>,
}

impl JsonFilePreferences {
    /// Open the file at `path`; a missing file starts empty
    ///
    /// # Errors
    /// * `Io` - The file exists but cannot be read
    /// * `Serialization` - The file is not a JSON object of numbers
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<f32> {
        self.values.lock().ok()?.get(key).copied()
    }

    fn set(&self, key: &str, value: f32) -> Result<()> {
        let content = {
            let mut values = self
                .values
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            values.insert(key.to_string(), value);
            serde_json::to_string_pretty(&*values)?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, content)?;
        Ok(())
    }
}
