//! File-backed local cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{CacheError, LocalCache, LOCAL_CACHE_KEY};

/// Stores the cache slot as `<data_dir>/prepMapData_local.json`.
#[derive(Debug, Clone)]
pub struct FileCache {
    data_dir: PathBuf,
}

impl FileCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", LOCAL_CACHE_KEY))
    }
}

impl LocalCache for FileCache {
    /// Returns `Ok(None)` if nothing has been cached yet.
    fn read(&self) -> Result<Option<String>, CacheError> {
        let path = self.path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Io(path, e)),
        }
    }

    /// Creates the data directory if needed, then overwrites the slot.
    fn write(&self, text: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| CacheError::Io(self.data_dir.clone(), e))?;

        let path = self.path();
        fs::write(&path, text).map_err(|e| CacheError::Io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_cache() -> (FileCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        (cache, temp_dir)
    }

    #[test]
    fn test_cache_path() {
        let (cache, _temp) = test_cache();
        assert!(cache.path().ends_with("prepMapData_local.json"));
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (cache, _temp) = test_cache();
        assert!(cache.read().unwrap().is_none());
    }

    #[test]
    fn test_write_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("data");
        let cache = FileCache::new(&nested);

        cache.write("{}").unwrap();

        assert!(nested.exists());
        assert_eq!(cache.read().unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_write_overwrites() {
        let (cache, _temp) = test_cache();
        cache.write("first").unwrap();
        cache.write("second").unwrap();
        assert_eq!(cache.read().unwrap().as_deref(), Some("second"));
    }
}
