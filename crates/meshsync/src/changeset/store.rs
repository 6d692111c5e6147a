//! Durable key-value store for snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::error::{Result, StoreError};

/// External key-value store holding one serialized snapshot per key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Establishes the connection; called again after a failure.
    async fn connect(&self) -> Result<()>;

    /// Reads a key. `Ok(None)` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrites a key.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Releases the connection. Safe when never connected.
    async fn close(&self);
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_state (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL
);";

/// SQLite-backed store. The connection is opened on `connect`.
///
/// All access is serialized through a `Mutex<Connection>`; blocking SQLite
/// calls run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteStateStore {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            match guard.as_ref() {
                Some(conn) => f(conn),
                None => Err(StoreError::NotConnected),
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn connect(&self) -> Result<()> {
        let path = self.path.clone();
        let slot = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().map_err(|_| StoreError::LockPoisoned)?;
            if guard.is_none() {
                *guard = Some(Self::open(&path)?);
                log::info!("State store opened at {}", path.display());
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_state WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        let slot = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || match slot.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        })
        .await;

        match closed {
            Ok(true) => log::info!("State store closed"),
            Ok(false) => {}
            Err(e) => log::warn!("Failed to close state store: {}", e),
        }
    }
}

/// In-process store. Can be switched to unreachable to exercise retry paths.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    unreachable: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `connect` fails until [`set_reachable`](Self::set_reachable) is called.
    pub fn unreachable() -> Self {
        let store = Self::default();
        store.unreachable.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Raw stored value, bypassing the connection state.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().ok()?.get(key).cloned()
    }

    /// Seeds a value, bypassing the connection state.
    pub fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        if let Ok(mut data) = self.data.lock() {
            data.insert(key.to_string(), value.into());
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("memory store offline".to_string()));
        }
        if !self.is_connected() {
            return Err(StoreError::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn connect(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("memory store offline".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;
        let data = self.data.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_connected()?;
        let mut data = self.data.lock().map_err(|_| StoreError::LockPoisoned)?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
