//! Single-slot persistence for the resolved location.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::types::{CacheError, LocationRecord};

const CACHE_FILE_NAME: &str = "location_cache.json";

/// Key-value persistence for the one serialized `LocationRecord`.
pub trait CacheStore: Send + Sync {
    /// # Errors
    /// Backend read failures.
    fn get(&self) -> Result<Option<String>, CacheError>;

    /// Overwrites any previous entry.
    ///
    /// # Errors
    /// Backend write failures.
    fn set(&self, value: &str) -> Result<(), CacheError>;

    /// Removing a missing entry is not an error.
    ///
    /// # Errors
    /// Backend delete failures.
    fn remove(&self) -> Result<(), CacheError>;
}

impl<C: CacheStore + ?Sized> CacheStore for std::sync::Arc<C> {
    fn get(&self) -> Result<Option<String>, CacheError> {
        (**self).get()
    }

    fn set(&self, value: &str) -> Result<(), CacheError> {
        (**self).set(value)
    }

    fn remove(&self) -> Result<(), CacheError> {
        (**self).remove()
    }
}

impl<C: CacheStore + ?Sized> CacheStore for Box<C> {
    fn get(&self) -> Result<Option<String>, CacheError> {
        (**self).get()
    }

    fn set(&self, value: &str) -> Result<(), CacheError> {
        (**self).set(value)
    }

    fn remove(&self) -> Result<(), CacheError> {
        (**self).remove()
    }
}

/// Session-scoped cache: lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    slot: Mutex<Option<String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self) -> Result<Option<String>, CacheError> {
        Ok(self.slot.lock().clone())
    }

    fn set(&self, value: &str) -> Result<(), CacheError> {
        *self.slot.lock() = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), CacheError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// JSON file in the app's config directory.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    cache_path: PathBuf,
}

impl FileCacheStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            cache_path: config_dir.join(CACHE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(&self.cache_path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, value: &str) -> Result<(), CacheError> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.cache_path, value)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.cache_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read the cached record. An entry that no longer parses is dropped and
/// reported as a miss.
///
/// # Errors
/// Backend read failures.
pub fn load_record<C: CacheStore + ?Sized>(
    cache: &C,
) -> Result<Option<LocationRecord>, CacheError> {
    let Some(raw) = cache.get()? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            tracing::warn!("Discarding unreadable location cache: {}", e);
            cache.remove()?;
            Ok(None)
        }
    }
}

/// Serialize and store `record`, replacing any previous entry.
///
/// # Errors
/// Serialization or backend write failures.
pub fn store_record<C: CacheStore + ?Sized>(
    cache: &C,
    record: &LocationRecord,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(record)?;
    cache.set(&raw)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::types::{Coordinate, PlaceName};
    use chrono::Utc;

    fn sample_record() -> LocationRecord {
        let mut record = LocationRecord::new(Coordinate::new(51.5074, -0.1278).unwrap(), Utc::now());
        record.city = PlaceName::Known("London".into());
        record.accuracy_meters = Some(12.5);
        record
    }

    #[test]
    fn test_memory_round_trip() {
        let cache = MemoryCacheStore::new();
        let record = sample_record();

        store_record(&cache, &record).unwrap();
        let loaded = load_record(&cache).unwrap().unwrap();

        assert_eq!(loaded.coordinate, record.coordinate);
        assert_eq!(loaded.city, record.city);
        assert_eq!(loaded.country, PlaceName::Unknown);
        assert_eq!(loaded.captured_at, record.captured_at);
    }

    #[test]
    fn test_memory_remove_is_idempotent() {
        let cache = MemoryCacheStore::new();
        store_record(&cache, &sample_record()).unwrap();
        cache.remove().unwrap();
        cache.remove().unwrap();
        assert!(load_record(&cache).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_removed() {
        let cache = MemoryCacheStore::new();
        cache.set("{not json").unwrap();
        assert!(load_record(&cache).unwrap().is_none());
        assert!(cache.get().unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_entry_is_a_miss() {
        let cache = MemoryCacheStore::new();
        cache
            .set(r#"{"coordinate":{"latitude":123.0,"longitude":0.0},"accuracy_meters":null,"city":null,"country":null,"captured_at":"2026-01-01T00:00:00Z"}"#)
            .unwrap();
        assert!(load_record(&cache).unwrap().is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCacheStore::new(dir.path());
        assert!(cache.get().unwrap().is_none());

        let record = sample_record();
        store_record(&cache, &record).unwrap();
        assert!(cache.path().exists());

        let reopened = FileCacheStore::new(dir.path());
        let loaded = load_record(&reopened).unwrap().unwrap();
        assert_eq!(loaded, record);

        reopened.remove().unwrap();
        reopened.remove().unwrap();
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_file_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = FileCacheStore::new(&nested);
        store_record(&cache, &sample_record()).unwrap();
        assert!(nested.join(CACHE_FILE_NAME).exists());
    }
}
