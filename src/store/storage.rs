//! SQLite-backed offline store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use crate::entities::{iso_now, EntityKind, Record};
use crate::error::StorageError;

use super::queue::{Operation, QueueEntry};
use super::schema;

/// A record as it sits in the local cache, with its sync metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecord<T> {
  pub record: T,
  /// True once this state is known to match the remote service.
  pub synced: bool,
}

/// Durable store for entity records and the pending-mutation queue.
///
/// All methods take `&self`; the connection is serialized behind a mutex and
/// every write runs as a single transaction.
pub struct OfflineStore {
  conn: Mutex<Connection>,
}

impl OfflineStore {
  /// Open (or create) the store at the default platform location,
  /// `<data dir>/moosync/cache.db`.
  pub fn open() -> Result<Self, StorageError> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(StorageError::CreateDir)?;
    }
    Self::from_connection(Connection::open(path)?)
  }

  /// In-memory store, for tests and disposable tooling.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.migrate()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
      .ok_or(StorageError::NoDataDir)?;
    Ok(data_dir.join("moosync").join("cache.db"))
  }

  /// Apply the schema in one transaction when the database is at an older
  /// version. Re-opening a current database is a no-op.
  fn migrate(&self) -> Result<(), StorageError> {
    let conn = self.lock()?;
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= schema::SCHEMA_VERSION {
      return Ok(());
    }
    conn.execute_batch(&format!(
      "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
      schema::SCHEMA,
      schema::SCHEMA_VERSION
    ))?;
    debug!("cache schema migrated to version {}", schema::SCHEMA_VERSION);
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }

  // ============================================================
  // Records
  // ============================================================

  /// Upsert records into the logical table for `T::kind()`, last write wins
  /// per id.
  ///
  /// Everything written through here is stamped `synced = true`: the caller
  /// is either mirroring a successful remote fetch or applying an optimistic
  /// write that is also being sent (or queued) for the remote.
  pub fn save<T: Record>(&self, records: &[T]) -> Result<(), StorageError> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
      rows.push((
        record.id().to_string(),
        serde_json::to_vec(record)?,
        record.created_at().to_string(),
        record.updated_at().to_string(),
      ));
    }
    self.upsert_rows(T::kind(), rows)
  }

  /// Upsert wire-level rows for a kind, used when mirroring a remote fetch
  /// without decoding into a typed record. Rows without an `id` are skipped.
  pub fn save_raw(&self, kind: EntityKind, rows: &[Value]) -> Result<(), StorageError> {
    let mut prepared = Vec::with_capacity(rows.len());
    for row in rows {
      let id = row.get("id").and_then(Value::as_str).unwrap_or_default();
      if id.is_empty() {
        debug!("skipping {kind} row without an id");
        continue;
      }
      prepared.push((
        id.to_string(),
        serde_json::to_vec(row)?,
        text_field(row, "created_at"),
        text_field(row, "updated_at"),
      ));
    }
    self.upsert_rows(kind, prepared)
  }

  fn upsert_rows(
    &self,
    kind: EntityKind,
    rows: Vec<(String, Vec<u8>, String, String)>,
  ) -> Result<(), StorageError> {
    if rows.is_empty() {
      return Ok(());
    }
    let conn = self.lock()?;
    conn.execute("BEGIN TRANSACTION", [])?;
    for (id, data, created_at, updated_at) in &rows {
      let result = conn.execute(
        "INSERT OR REPLACE INTO records (kind, id, data, created_at, updated_at, synced)
         VALUES (?, ?, ?, ?, ?, 1)",
        params![kind.table_name(), id, data, created_at, updated_at],
      );
      if let Err(err) = result {
        let _ = conn.execute("ROLLBACK", []);
        return Err(err.into());
      }
    }
    conn.execute("COMMIT", [])?;
    Ok(())
  }

  /// All cached records of this kind. No ordering guarantee; callers sort.
  pub fn get<T: Record>(&self) -> Result<Vec<CachedRecord<T>>, StorageError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT data, synced FROM records WHERE kind = ?")?;
    let rows = stmt.query_map(params![T::kind().table_name()], |row| {
      Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, bool>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
      let (data, synced) = row?;
      match serde_json::from_slice(&data) {
        Ok(record) => records.push(CachedRecord { record, synced }),
        Err(err) => debug!("skipping undecodable cached {} row: {err}", T::kind()),
      }
    }
    Ok(records)
  }

  /// All cached rows of this kind as raw JSON.
  pub fn get_raw(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT data FROM records WHERE kind = ?")?;
    let rows = stmt.query_map(params![kind.table_name()], |row| row.get::<_, Vec<u8>>(0))?;

    let mut values = Vec::new();
    for row in rows {
      values.push(serde_json::from_slice(&row?)?);
    }
    Ok(values)
  }

  /// Cached record count per kind, for status displays.
  pub fn record_counts(&self) -> Result<Vec<(EntityKind, i64)>, StorageError> {
    let conn = self.lock()?;
    let mut counts = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
      let count = conn.query_row(
        "SELECT COUNT(*) FROM records WHERE kind = ?",
        params![kind.table_name()],
        |row| row.get(0),
      )?;
      counts.push((kind, count));
    }
    Ok(counts)
  }

  // ============================================================
  // Sync queue
  // ============================================================

  /// Append one pending mutation. Returns its queue id once the row is
  /// durably written, so callers can only report "saved offline" after the
  /// entry actually is.
  pub fn add_to_sync_queue(
    &self,
    operation: Operation,
    table: EntityKind,
    data: &Value,
  ) -> Result<i64, StorageError> {
    let payload = serde_json::to_vec(data)?;
    let conn = self.lock()?;
    conn.execute(
      "INSERT INTO sync_queue (operation, kind, data, timestamp) VALUES (?, ?, ?, ?)",
      params![operation.as_str(), table.table_name(), payload, iso_now()],
    )?;
    Ok(conn.last_insert_rowid())
  }

  /// Every pending entry, oldest first.
  pub fn get_sync_queue(&self) -> Result<Vec<QueueEntry>, StorageError> {
    let conn = self.lock()?;
    let mut stmt =
      conn.prepare("SELECT id, operation, kind, data, timestamp FROM sync_queue ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
      Ok((
        row.get::<_, i64>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, Vec<u8>>(3)?,
        row.get::<_, String>(4)?,
      ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
      let (id, op, kind, data, timestamp) = row?;
      let (Some(operation), Some(table)) =
        (Operation::parse(&op), EntityKind::from_table_name(&kind))
      else {
        debug!("skipping unrecognized queue row {id} ({op} {kind})");
        continue;
      };
      entries.push(QueueEntry {
        id,
        operation,
        table,
        data: serde_json::from_slice(&data)?,
        timestamp,
      });
    }
    Ok(entries)
  }

  /// Delete every queued entry. Idempotent; called only after a replay pass
  /// in which all entries succeeded.
  pub fn clear_sync_queue(&self) -> Result<(), StorageError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM sync_queue", [])?;
    Ok(())
  }

  /// Number of mutations waiting to be replayed.
  pub fn pending_sync_count(&self) -> Result<i64, StorageError> {
    let conn = self.lock()?;
    Ok(conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?)
  }

  /// Run arbitrary SQL against the store, for tests that need to put the
  /// database into a shape the public surface cannot produce.
  #[cfg(test)]
  pub(crate) fn run_sql(&self, sql: &str) -> Result<(), StorageError> {
    let conn = self.lock()?;
    conn.execute_batch(sql)?;
    Ok(())
  }
}

fn text_field(row: &Value, key: &str) -> String {
  row
    .get(key)
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::entities::SalesRecord;

  fn sale(id: &str, product: &str) -> SalesRecord {
    SalesRecord {
      id: id.into(),
      date: "2024-06-01".into(),
      product_type: product.into(),
      quantity: 5.0,
      amount: 300.0,
      created_at: "2024-06-01T08:00:00.000Z".into(),
      updated_at: "2024-06-01T08:00:00.000Z".into(),
      ..Default::default()
    }
  }

  #[test]
  fn saved_records_come_back_marked_synced() {
    let store = OfflineStore::open_in_memory().unwrap();
    store.save(&[sale("s1", "milk"), sale("s2", "eggs")]).unwrap();

    let cached = store.get::<SalesRecord>().unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|c| c.synced));
    assert!(cached.iter().any(|c| c.record == sale("s1", "milk")));
  }

  #[test]
  fn save_overwrites_by_id() {
    let store = OfflineStore::open_in_memory().unwrap();
    store.save(&[sale("s1", "milk")]).unwrap();
    store.save(&[sale("s1", "yoghurt")]).unwrap();

    let cached = store.get::<SalesRecord>().unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].record.product_type, "yoghurt");
  }

  #[test]
  fn kinds_do_not_bleed_into_each_other() {
    let store = OfflineStore::open_in_memory().unwrap();
    store.save(&[sale("s1", "milk")]).unwrap();

    assert!(store.get::<crate::entities::Cow>().unwrap().is_empty());
    assert_eq!(store.get_raw(EntityKind::SalesRecords).unwrap().len(), 1);
  }

  #[test]
  fn save_raw_skips_rows_without_ids() {
    let store = OfflineStore::open_in_memory().unwrap();
    let rows = vec![
      json!({"id": "c1", "name": "Bessie", "health_status": "healthy"}),
      json!({"name": "no-id"}),
    ];
    store.save_raw(EntityKind::Cows, &rows).unwrap();
    assert_eq!(store.get_raw(EntityKind::Cows).unwrap().len(), 1);
  }

  #[test]
  fn queue_preserves_insertion_order() {
    let store = OfflineStore::open_in_memory().unwrap();
    let first = store
      .add_to_sync_queue(Operation::Insert, EntityKind::Cows, &json!({"id": "c1"}))
      .unwrap();
    let second = store
      .add_to_sync_queue(Operation::Update, EntityKind::MilkRecords, &json!({"id": "m1"}))
      .unwrap();
    assert!(second > first);

    let entries = store.get_sync_queue().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, first);
    assert_eq!(entries[0].operation, Operation::Insert);
    assert_eq!(entries[0].table, EntityKind::Cows);
    assert_eq!(entries[1].id, second);
    assert_eq!(entries[1].operation, Operation::Update);
    assert!(!entries[0].timestamp.is_empty());
  }

  #[test]
  fn clear_sync_queue_is_idempotent() {
    let store = OfflineStore::open_in_memory().unwrap();
    store
      .add_to_sync_queue(Operation::Insert, EntityKind::Shops, &json!({"id": "sh1"}))
      .unwrap();

    store.clear_sync_queue().unwrap();
    assert_eq!(store.pending_sync_count().unwrap(), 0);
    // Clearing an already-empty queue succeeds and changes nothing.
    store.clear_sync_queue().unwrap();
    assert_eq!(store.pending_sync_count().unwrap(), 0);
  }

  #[test]
  fn record_counts_cover_every_kind() {
    let store = OfflineStore::open_in_memory().unwrap();
    store.save(&[sale("s1", "milk")]).unwrap();

    let counts = store.record_counts().unwrap();
    assert_eq!(counts.len(), EntityKind::ALL.len());
    let sales = counts.iter().find(|(k, _)| *k == EntityKind::SalesRecords).unwrap();
    assert_eq!(sales.1, 1);
    let cows = counts.iter().find(|(k, _)| *k == EntityKind::Cows).unwrap();
    assert_eq!(cows.1, 0);
  }

  #[test]
  fn reopening_a_database_keeps_data_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    {
      let store = OfflineStore::open_at(&path).unwrap();
      store.save(&[sale("s1", "milk")]).unwrap();
    }
    let store = OfflineStore::open_at(&path).unwrap();
    assert_eq!(store.get::<SalesRecord>().unwrap().len(), 1);
  }
}
