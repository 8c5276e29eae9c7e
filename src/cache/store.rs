//! Local store trait and SQLite implementation.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CacheError;

/// Trait for the on-device key/value store backing the local cache.
///
/// All operations are local and synchronous. Absence is a first-class
/// result, never an error; `delete` on a missing key is a no-op.
pub trait LocalStore: Send + Sync {
  /// Get the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

  /// Store `value` under `key`, replacing any previous value. Each write is
  /// atomic at the granularity of one key: a concurrent `get` observes the
  /// value before or after, never a torn one.
  fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

  /// Remove the value under `key`. No-op if absent.
  fn delete(&self, key: &str) -> Result<(), CacheError>;

  /// Remove every entry whose key starts with `prefix`.
  fn clear_prefix(&self, prefix: &str) -> Result<(), CacheError>;

  /// Remove everything.
  fn clear_all(&self) -> Result<(), CacheError>;
}

/// Schema for the asset cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS asset_cache (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed local store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self, CacheError> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).map_err(|e| CacheError::Open {
      path: path.display().to_string(),
      source: e,
    })?;

    Self::from_conn(conn)
  }

  /// Open an in-memory store. Used by tests.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    Self::from_conn(Connection::open_in_memory()?)
  }

  fn from_conn(conn: Connection) -> Result<Self, CacheError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(CacheError::NoDataDir)?;

    Ok(data_dir.join("menuboard-sync").join("cache.db"))
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
    self.conn.lock().map_err(|_| CacheError::LockPoisoned)
  }
}

impl LocalStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let conn = self.conn()?;
    let value = conn
      .query_row(
        "SELECT value FROM asset_cache WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
    let conn = self.conn()?;
    conn.execute(
      "INSERT OR REPLACE INTO asset_cache (key, value, cached_at)
       VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), CacheError> {
    let conn = self.conn()?;
    conn.execute("DELETE FROM asset_cache WHERE key = ?", params![key])?;
    Ok(())
  }

  fn clear_prefix(&self, prefix: &str) -> Result<(), CacheError> {
    let conn = self.conn()?;
    // ESCAPE so owners containing LIKE metacharacters cannot widen the match.
    let pattern = format!(
      "{}%",
      prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    );
    conn.execute(
      "DELETE FROM asset_cache WHERE key LIKE ? ESCAPE '\\'",
      params![pattern],
    )?;
    Ok(())
  }

  fn clear_all(&self) -> Result<(), CacheError> {
    let conn = self.conn()?;
    conn.execute("DELETE FROM asset_cache", [])?;
    Ok(())
  }
}
