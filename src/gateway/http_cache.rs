//! SQLite-backed response cache for the fetch gateway.
//!
//! Rows are keyed by (cache name, url hash): the hash keeps the key compact
//! and uniform while the readable url column stays available for debugging.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use url::Url;

use crate::entities::iso_now;
use crate::error::StorageError;

use super::transport::FetchResponse;

const RESPONSES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS responses (
    cache_name TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_responses_cache_name ON responses(cache_name);
";

pub struct HttpCache {
  conn: Mutex<Connection>,
}

impl HttpCache {
  /// Open (or create) the cache at the default platform location,
  /// `<data dir>/moosync/http_cache.db`.
  pub fn open() -> Result<Self, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
      .ok_or(StorageError::NoDataDir)?;
    Self::open_at(&data_dir.join("moosync").join("http_cache.db"))
  }

  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(StorageError::CreateDir)?;
    }
    Self::from_connection(Connection::open(path)?)
  }

  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(RESPONSES_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }

  /// Store a response under this cache name, replacing any previous entry
  /// for the same url.
  pub fn put(
    &self,
    cache_name: &str,
    url: &Url,
    response: &FetchResponse,
  ) -> Result<(), StorageError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO responses
         (cache_name, url_hash, url, status, content_type, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        cache_name,
        url_key(url),
        url.as_str(),
        response.status,
        response.content_type,
        response.body,
        iso_now(),
      ],
    )?;
    Ok(())
  }

  /// The cached response for this url, if any.
  pub fn lookup(&self, cache_name: &str, url: &Url) -> Result<Option<FetchResponse>, StorageError> {
    let conn = self.lock()?;
    let found = conn
      .query_row(
        "SELECT status, content_type, body FROM responses
         WHERE cache_name = ? AND url_hash = ?",
        params![cache_name, url_key(url)],
        |row| {
          Ok(FetchResponse {
            status: row.get(0)?,
            content_type: row.get(1)?,
            body: row.get(2)?,
          })
        },
      )
      .optional()?;
    Ok(found)
  }

  /// Drop every entry whose cache name is not in `keep`. Returns the number
  /// of entries dropped.
  pub fn prune_versions(&self, keep: &[&str]) -> Result<usize, StorageError> {
    let conn = self.lock()?;
    if keep.is_empty() {
      return Ok(conn.execute("DELETE FROM responses", [])?);
    }
    let placeholders = vec!["?"; keep.len()].join(", ");
    let sql = format!("DELETE FROM responses WHERE cache_name NOT IN ({placeholders})");
    Ok(conn.execute(&sql, rusqlite::params_from_iter(keep.iter()))?)
  }
}

fn url_key(url: &Url) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}
