//! In-memory store shared by every consumer of a data source.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{trace, warn};

/// A single stored value.
struct CacheEntry {
  value: Arc<dyn Any + Send + Sync>,
  /// Store-wide monotonic write counter at the time of this write
  version: u64,
  stored_at: DateTime<Utc>,
}

/// Metadata about a stored entry, independent of its value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
  pub version: u64,
  pub stored_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
  entries: HashMap<String, CacheEntry>,
  last_version: u64,
}

impl Inner {
  fn write<T: Send + Sync + 'static>(&mut self, key: &str, value: T) -> u64 {
    self.last_version += 1;
    let version = self.last_version;
    self.entries.insert(
      key.to_string(),
      CacheEntry {
        value: Arc::new(value),
        version,
        stored_at: Utc::now(),
      },
    );
    version
  }
}

/// Process-wide key/value store for remote data.
///
/// Cloning a `KeyedCache` yields another handle to the same store, so it can be
/// created once and handed to every consumer. Tests create their own isolated
/// stores instead of sharing global state.
///
/// There is no eviction, no TTL and no merging: concurrent writers to the same
/// key race and the last call wins.
#[derive(Clone, Default)]
pub struct KeyedCache {
  inner: Arc<RwLock<Inner>>,
}

impl KeyedCache {
  /// Create an empty store.
  pub fn new() -> Self {
    Self::default()
  }

  fn read(&self) -> RwLockReadGuard<'_, Inner> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write_lock(&self) -> RwLockWriteGuard<'_, Inner> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store `value` under `key`, returning the stored value.
  pub fn set<T>(&self, key: &str, value: T) -> T
  where
    T: Clone + Send + Sync + 'static,
  {
    self.write(key, value.clone());
    value
  }

  /// Store `value` under `key`, returning the version assigned to the write.
  pub fn write<T>(&self, key: &str, value: T) -> u64
  where
    T: Send + Sync + 'static,
  {
    let version = self.write_lock().write(key, value);
    trace!(key, version, "cache write");
    version
  }

  /// Store `value` only if the entry for `key` is still at `expected` version.
  ///
  /// Returns the new version on success, `None` if another write got there first.
  pub fn set_if_version<T>(&self, key: &str, expected: u64, value: T) -> Option<u64>
  where
    T: Send + Sync + 'static,
  {
    let mut inner = self.write_lock();
    let current = inner.entries.get(key).map(|e| e.version);
    if current != Some(expected) {
      trace!(key, expected, ?current, "cache write skipped, entry moved on");
      return None;
    }
    let version = inner.write(key, value);
    trace!(key, version, "cache write");
    Some(version)
  }

  /// Get the last stored value for `key`.
  ///
  /// Returns `None` if the key is absent or holds a value of another type.
  pub fn get<T>(&self, key: &str) -> Option<T>
  where
    T: Clone + Send + Sync + 'static,
  {
    self.get_versioned(key).map(|(value, _)| value)
  }

  /// Get the last stored value for `key` together with its version.
  pub fn get_versioned<T>(&self, key: &str) -> Option<(T, u64)>
  where
    T: Clone + Send + Sync + 'static,
  {
    let inner = self.read();
    let entry = inner.entries.get(key)?;
    match entry.value.downcast_ref::<T>() {
      Some(value) => Some((value.clone(), entry.version)),
      None => {
        warn!(
          key,
          expected = std::any::type_name::<T>(),
          "cache entry holds a value of a different type"
        );
        None
      }
    }
  }

  /// Whether anything is stored under `key`.
  pub fn contains(&self, key: &str) -> bool {
    self.read().entries.contains_key(key)
  }

  /// Current version of the entry for `key`.
  pub fn version(&self, key: &str) -> Option<u64> {
    self.info(key).map(|info| info.version)
  }

  /// Version and write time of the entry for `key`.
  pub fn info(&self, key: &str) -> Option<EntryInfo> {
    self.read().entries.get(key).map(|e| EntryInfo {
      version: e.version,
      stored_at: e.stored_at,
    })
  }

  /// Drop the entry for `key`. Nothing calls this automatically.
  pub fn remove(&self, key: &str) -> bool {
    self.write_lock().entries.remove(key).is_some()
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.write_lock().entries.clear();
  }

  pub fn len(&self) -> usize {
    self.read().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().entries.is_empty()
  }

  /// All stored keys, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.read().entries.keys().cloned().collect();
    keys.sort();
    keys
  }
}

impl std::fmt::Debug for KeyedCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("KeyedCache")
      .field("keys", &self.keys())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_read_after_write() {
    let cache = KeyedCache::new();
    let stored = cache.set("/merchant/plan/list", vec![1u64, 2, 3]);
    assert_eq!(stored, vec![1, 2, 3]);
    assert_eq!(cache.get::<Vec<u64>>("/merchant/plan/list"), Some(vec![1, 2, 3]));
  }

  #[test]
  fn test_missing_key() {
    let cache = KeyedCache::new();
    assert_eq!(cache.get::<String>("nope"), None);
    assert!(!cache.contains("nope"));
    assert!(cache.is_empty());
  }

  #[test]
  fn test_last_write_wins() {
    let cache = KeyedCache::new();
    cache.set("k", "first".to_string());
    cache.set("k", "second".to_string());
    assert_eq!(cache.get::<String>("k").as_deref(), Some("second"));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_type_mismatch_reads_none() {
    let cache = KeyedCache::new();
    cache.set("k", 42u32);
    assert_eq!(cache.get::<String>("k"), None);
    assert_eq!(cache.get::<u32>("k"), Some(42));
  }

  #[test]
  fn test_handles_share_one_store() {
    let cache = KeyedCache::new();
    let other = cache.clone();
    other.set("shared", 7i64);
    assert_eq!(cache.get::<i64>("shared"), Some(7));
  }

  #[test]
  fn test_isolated_stores() {
    let a = KeyedCache::new();
    let b = KeyedCache::new();
    a.set("k", 1u8);
    assert!(!b.contains("k"));
  }

  #[test]
  fn test_versions_increase() {
    let cache = KeyedCache::new();
    let v1 = cache.write("k", 1u8);
    let v2 = cache.write("other", 2u8);
    let v3 = cache.write("k", 3u8);
    assert!(v1 < v2 && v2 < v3);
    assert_eq!(cache.version("k"), Some(v3));
    assert!(cache.info("k").is_some());
  }

  #[test]
  fn test_set_if_version() {
    let cache = KeyedCache::new();
    let v1 = cache.write("k", 1u8);
    let v2 = cache.set_if_version("k", v1, 2u8);
    assert!(v2.is_some());
    assert_eq!(cache.set_if_version("k", v1, 3u8), None);
    assert_eq!(cache.get::<u8>("k"), Some(2));
    assert_eq!(cache.set_if_version("absent", 1, 9u8), None);
  }

  #[test]
  fn test_remove_and_clear() {
    let cache = KeyedCache::new();
    cache.set("b", 1u8);
    cache.set("a", 2u8);
    assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
    assert!(cache.remove("a"));
    assert!(!cache.remove("a"));
    cache.clear();
    assert!(cache.is_empty());
  }
}
