// packages/sdk/src/runtime/storage.rs
//! Key/value storage
//!
//! Two stores with the same shape but different lifetimes back identity and
//! the failed-event spill: a session-scoped store and a browser-persistent
//! store. Either may be unavailable, in which case a namespaced in-memory
//! fallback serves the rest of the process lifetime (warned once).

use crate::utils::errors::{MonitorError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Minimal key/value interface shared by both store lifetimes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile store; also the fallback when a backing store is unavailable.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().remove(key);
        Ok(())
    }
}

/// SQLite-backed persistent store.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| MonitorError::StorageFailed(format!("failed to open store: {}", e)))?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| MonitorError::StorageFailed(format!("schema creation failed: {}", e)))?;

        debug!(path = %path.as_ref().display(), "persistent store opened");

        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT value FROM kv WHERE key = ?")
            .map_err(|e| MonitorError::StorageFailed(e.to_string()))?;

        let mut rows = stmt
            .query(params![key])
            .map_err(|e| MonitorError::StorageFailed(e.to_string()))?;

        match rows.next().map_err(|e| MonitorError::StorageFailed(e.to_string()))? {
            Some(row) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| MonitorError::StorageFailed(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| MonitorError::StorageFailed(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute("DELETE FROM kv WHERE key = ?", params![key])
            .map_err(|e| MonitorError::StorageFailed(e.to_string()))?;
        Ok(())
    }
}

/// A namespaced store handle with transparent in-memory fallback.
///
/// Keys are prefixed `monitor_<appId>:`. The first backing-store failure
/// degrades the handle to the fallback for the rest of the process and
/// warns once.
pub struct StorageHandle {
    backing: Option<Box<dyn KeyValueStore>>,
    fallback: MemoryStore,
    degraded: AtomicBool,
    prefix: String,
}

impl StorageHandle {
    /// Wrap a backing store, namespacing keys for `app_id`.
    pub fn new(backing: Option<Box<dyn KeyValueStore>>, app_id: &str) -> Self {
        Self {
            backing,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
            prefix: format!("monitor_{}", app_id),
        }
    }

    /// In-memory handle (no backing store at all).
    pub fn in_memory(app_id: &str) -> Self {
        Self::new(None, app_id)
    }

    /// The fully namespaced form of `key`.
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn degrade(&self, err: &MonitorError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(error = %err, "backing store unavailable, falling back to in-memory storage");
        }
    }

    fn active(&self) -> Option<&dyn KeyValueStore> {
        if self.degraded.load(Ordering::Relaxed) {
            return None;
        }
        self.backing.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let key = self.namespaced(key);
        if let Some(store) = self.active() {
            match store.get(&key) {
                Ok(value) => return value,
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.get(&key).unwrap_or(None)
    }

    pub fn set(&self, key: &str, value: &str) {
        let key = self.namespaced(key);
        if let Some(store) = self.active() {
            match store.set(&key, value) {
                Ok(()) => return,
                Err(e) => self.degrade(&e),
            }
        }
        let _ = self.fallback.set(&key, value);
    }

    pub fn remove(&self, key: &str) {
        let key = self.namespaced(key);
        if let Some(store) = self.active() {
            match store.remove(&key) {
                Ok(()) => return,
                Err(e) => self.degrade(&e),
            }
        }
        let _ = self.fallback.remove(&key);
    }

    /// Whether the handle has fallen back to in-memory storage.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A store that fails every operation, for fallback tests.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(MonitorError::StorageFailed("quota exceeded".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(MonitorError::StorageFailed("quota exceeded".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(MonitorError::StorageFailed("quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("kv.db")).unwrap();

        store.set("session_id", "123-abc").unwrap();
        assert_eq!(store.get("session_id").unwrap().as_deref(), Some("123-abc"));

        store.set("session_id", "456-def").unwrap();
        assert_eq!(store.get("session_id").unwrap().as_deref(), Some("456-def"));

        store.remove("session_id").unwrap();
        assert_eq!(store.get("session_id").unwrap(), None);
    }

    #[test]
    fn test_handle_namespacing() {
        let handle = StorageHandle::in_memory("shop");
        assert_eq!(handle.namespaced("failed_events"), "monitor_shop:failed_events");

        handle.set("user_id", "u1");
        assert_eq!(handle.get("user_id").as_deref(), Some("u1"));
    }

    #[test]
    fn test_handle_degrades_once() {
        let handle = StorageHandle::new(Some(Box::new(BrokenStore)), "shop");

        handle.set("k", "v");
        assert!(handle.is_degraded());
        // The fallback now serves reads and writes
        assert_eq!(handle.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_handle_prefers_backing_store() {
        let dir = tempdir().unwrap();
        let sqlite = SqliteStore::open(dir.path().join("kv.db")).unwrap();
        let handle = StorageHandle::new(Some(Box::new(sqlite)), "shop");

        handle.set("user_id", "u1");
        assert!(!handle.is_degraded());

        // Visible through a fresh connection under the namespaced key
        let reopened = SqliteStore::open(dir.path().join("kv.db")).unwrap();
        assert_eq!(
            reopened.get("monitor_shop:user_id").unwrap().as_deref(),
            Some("u1")
        );
    }
}
