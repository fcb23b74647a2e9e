use std::path::PathBuf;

use crate::error::StoreError;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_INDEX_DIR: &str = "index";
pub const DATA_FILE: &str = "entries.dat";
pub const INDEX_FILE: &str = "entries.idx";
pub const INDEX_META_FILE: &str = "index.json";

/// Where a named cache keeps its data log and key index.
///
/// ```text
/// <location>/<cache>/<data dir>/entries.dat
/// <location>/<cache>/<index dir>/entries.idx
/// <location>/<cache>/<index dir>/index.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    location: PathBuf,
    cache: String,
    data_dir_name: Option<String>,
    index_dir_name: Option<String>,
}

impl StoreLayout {
    pub fn new(location: impl Into<PathBuf>, cache: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            cache: cache.into(),
            data_dir_name: None,
            index_dir_name: None,
        }
    }

    /// Override the data directory name inside the cache directory.
    pub fn with_data_dir_name(mut self, name: Option<String>) -> Self {
        self.data_dir_name = name;
        self
    }

    /// Override the index directory name inside the cache directory.
    pub fn with_index_dir_name(mut self, name: Option<String>) -> Self {
        self.index_dir_name = name;
        self
    }

    pub fn cache(&self) -> &str {
        &self.cache
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.location.join(&self.cache)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.cache_dir()
            .join(self.data_dir_name.as_deref().unwrap_or(DEFAULT_DATA_DIR))
    }

    pub fn index_dir(&self) -> PathBuf {
        self.cache_dir()
            .join(self.index_dir_name.as_deref().unwrap_or(DEFAULT_INDEX_DIR))
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_dir().join(DATA_FILE)
    }

    /// Check names for path tricks. Does not touch the filesystem.
    pub fn check_names(&self) -> Result<(), StoreError> {
        check_component("cache name", &self.cache)?;
        if let Some(name) = &self.data_dir_name {
            check_component("data directory name", name)?;
        }
        if let Some(name) = &self.index_dir_name {
            check_component("index directory name", name)?;
        }
        Ok(())
    }

    /// Verify that an existing store lives at this layout.
    ///
    /// The index directory may be missing; it is recreated by a rebuild.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.check_names()?;
        if !self.location.is_dir() {
            return Err(StoreError::NotFound(format!(
                "location {} is not a directory",
                self.location.display()
            )));
        }
        let cache_dir = self.cache_dir();
        if !cache_dir.is_dir() {
            return Err(StoreError::NotFound(format!(
                "no directory for cache '{}' at {}",
                self.cache,
                cache_dir.display()
            )));
        }
        let data_dir = self.data_dir();
        if !data_dir.is_dir() {
            return Err(StoreError::NotFound(format!(
                "data directory {} is missing",
                data_dir.display()
            )));
        }
        let data_file = self.data_file();
        if !data_file.is_file() {
            return Err(StoreError::NotFound(format!(
                "data log {} is missing",
                data_file.display()
            )));
        }
        Ok(())
    }
}

fn check_component(what: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidLayout(format!(
            "{what} {name:?} must be a single directory name"
        )));
    }
    Ok(())
}
