//! Storage backend trait and implementations
//!
//! A backend turns value trees into text and back. The store only talks to
//! the [`StorageBackend`] trait; file extension and format come from it.

use crate::error::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

/// Trait for storage backend implementations
pub trait StorageBackend: Clone + Send + Sync {
    /// File extension for this storage format (e.g., "json", "toml")
    fn extension(&self) -> &str;

    /// Serialize data to string
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be represented in this format.
    fn serialize<T: Serialize>(&self, data: &T) -> Result<String>;

    /// Deserialize data from string
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not valid for this format.
    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T>;

    /// Read and deserialize from file
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file cannot be read, or a parse
    /// error if its content is malformed.
    fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.deserialize(&content)
    }

    /// Serialize and write to file
    ///
    /// The content goes to `<name>.tmp` first and is renamed over `path`, so a
    /// failed write never clobbers the previous file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, directory creation, the temp write,
    /// or the rename fails.
    fn write<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let content = self.serialize(data)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file_name = path.file_name().ok_or_else(|| {
            Error::Config(format!(
                "Invalid path '{}': must have a filename",
                path.display()
            ))
        })?;
        let mut temp_filename = file_name.to_os_string();
        temp_filename.push(".tmp");
        let temp_path = path.with_file_name(temp_filename);

        std::fs::write(&temp_path, &content).map_err(|e| Error::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            Error::FileWrite {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }
}

// =============================================================================
// JSON Storage Implementation
// =============================================================================

/// JSON storage backend (default)
#[derive(Debug, Clone)]
pub struct JsonStorage {
    pretty: bool,
}

impl Default for JsonStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStorage {
    /// Create a JSON backend with pretty printing enabled
    #[must_use]
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Create a compact JSON backend (no pretty printing)
    #[must_use]
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl StorageBackend for JsonStorage {
    fn extension(&self) -> &str {
        "json"
    }

    fn serialize<T: Serialize>(&self, data: &T) -> Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(data).map_err(Error::from)
        } else {
            serde_json::to_string(data).map_err(Error::from)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        serde_json::from_str(content).map_err(|e| Error::Parse(e.to_string()))
    }
}

// =============================================================================
// TOML Storage Implementation
// =============================================================================

/// TOML storage backend.
///
/// TOML has no null, so absent values cannot be written with this backend.
#[cfg(feature = "toml-storage")]
#[derive(Debug, Clone, Default)]
pub struct TomlStorage;

#[cfg(feature = "toml-storage")]
impl TomlStorage {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "toml-storage")]
impl StorageBackend for TomlStorage {
    fn extension(&self) -> &str {
        "toml"
    }

    fn serialize<T: Serialize>(&self, data: &T) -> Result<String> {
        toml::to_string_pretty(data).map_err(|e| Error::Parse(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        toml::from_str(content).map_err(|e| Error::Parse(e.to_string()))
    }
}

// =============================================================================
// YAML Storage Implementation
// =============================================================================

/// YAML storage backend
#[cfg(feature = "yaml-storage")]
#[derive(Debug, Clone, Default)]
pub struct YamlStorage;

#[cfg(feature = "yaml-storage")]
impl YamlStorage {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "yaml-storage")]
impl StorageBackend for YamlStorage {
    fn extension(&self) -> &str {
        "yaml"
    }

    fn serialize<T: Serialize>(&self, data: &T) -> Result<String> {
        serde_yaml::to_string(data).map_err(|e| Error::Parse(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        serde_yaml::from_str(content).map_err(|e| Error::Parse(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
