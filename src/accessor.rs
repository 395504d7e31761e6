//! Offline-aware data access, the surface the UI talks to.
//!
//! One accessor per entity kind. Every operation decides from the current
//! connectivity whether to hit the remote service or fall back to the local
//! cache and queue, and keeps an in-memory view in step with both so there is
//! always something to render. Writes are optimistic: the view and the cache
//! change before the network is involved, and a failed remote write is
//! reported as a notice, never rolled back.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::entities::{fresh_id, iso_now, Record};
use crate::gateway::WorkerMessage;
use crate::notice::{Notice, Notifier};
use crate::remote::RemoteService;
use crate::store::{OfflineStore, Operation};
use crate::sync::{ReplayReport, SyncEngine};

pub struct DataAccessor<T: Record> {
  remote: Arc<dyn RemoteService>,
  store: Arc<OfflineStore>,
  connectivity: Arc<ConnectivityMonitor>,
  engine: Arc<SyncEngine>,
  notices: Notifier,
  view: RwLock<Vec<T>>,
}

impl<T: Record> DataAccessor<T> {
  pub fn new(
    remote: Arc<dyn RemoteService>,
    store: Arc<OfflineStore>,
    connectivity: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    notices: Notifier,
  ) -> Self {
    Self {
      remote,
      store,
      connectivity,
      engine,
      notices,
      view: RwLock::new(Vec::new()),
    }
  }

  /// Load this kind's records: from the remote when online (mirroring the
  /// result into the local cache), from the cache otherwise. Never fails; a
  /// broken store degrades to an empty list plus a notice.
  pub async fn fetch(&self) -> Vec<T> {
    if self.connectivity.is_online() {
      match self.remote.select_all(T::kind()).await {
        Ok(rows) => {
          let records = decode_rows::<T>(rows);
          if let Err(err) = self.store.save(&records) {
            warn!("could not mirror the {} fetch into the cache: {err}", T::kind());
          }
          self.replace_view(records.clone());
          return records;
        }
        Err(err) => {
          warn!("remote fetch for {} failed, using the cache: {err}", T::kind());
          self.notices.publish(Notice::warning(
            "Connection Error",
            "Using cached data. Some information may be outdated.",
          ));
        }
      }
    }
    self.fetch_cached()
  }

  /// Manual refresh, same path as `fetch`.
  pub async fn refetch(&self) -> Vec<T> {
    self.fetch().await
  }

  /// Snapshot of the in-memory view, in the order it was last loaded
  /// (newest first after a remote fetch).
  pub fn records(&self) -> Vec<T> {
    self.read_view().clone()
  }

  /// Record a new entity. Missing envelope fields are stamped here: a fresh
  /// id (so offline-created records never collide on replay) and the current
  /// time. Returns the stamped record.
  pub async fn add(&self, mut record: T) -> T {
    if record.id().is_empty() {
      record.set_id(fresh_id());
    }
    let now = iso_now();
    if record.created_at().is_empty() {
      record.set_created_at(now.clone());
    }
    if record.updated_at().is_empty() {
      record.set_updated_at(now);
    }

    // Optimistic: the view and the cache change before the network does.
    self.write_view().insert(0, record.clone());
    if let Err(err) = self.store.save(std::slice::from_ref(&record)) {
      warn!("could not cache the new {} record: {err}", T::kind());
      self
        .notices
        .publish(Notice::error("Error", "Failed to save record"));
    }

    let row = match serde_json::to_value(&record) {
      Ok(row) => row,
      Err(err) => {
        warn!("unencodable {} record: {err}", T::kind());
        self
          .notices
          .publish(Notice::error("Error", "Failed to save record"));
        return record;
      }
    };

    if self.connectivity.is_online() {
      if let Err(err) = self.remote.insert(T::kind(), row).await {
        warn!("remote insert for {} failed: {err}", T::kind());
        self
          .notices
          .publish(Notice::error("Error", "Failed to save record"));
      }
    } else {
      match self.store.add_to_sync_queue(Operation::Insert, T::kind(), &row) {
        Ok(_) => self.notices.publish(Notice::info(
          "Saved Offline",
          "Your data will sync when connection returns.",
        )),
        Err(err) => {
          warn!("could not queue the offline insert for {}: {err}", T::kind());
          self
            .notices
            .publish(Notice::error("Error", "Failed to save record"));
        }
      }
    }
    record
  }

  /// Apply a partial update to the record with this id. `patch` is a JSON
  /// object of changed fields; `updated_at` is stamped automatically and the
  /// merge is shallow, last write wins per field.
  pub async fn update(&self, id: &str, patch: Value) {
    let Value::Object(mut fields) = patch else {
      warn!("update patch for {} must be a JSON object", T::kind());
      self
        .notices
        .publish(Notice::error("Error", "Failed to update record"));
      return;
    };
    fields.insert("updated_at".into(), Value::String(iso_now()));
    let patch = Value::Object(fields);

    // Optimistic merge into the view, then persist the merged record.
    let mut merged: Option<T> = None;
    {
      let mut view = self.write_view();
      for item in view.iter_mut() {
        if item.id() == id {
          if let Some(updated) = merge_record(item, &patch) {
            *item = updated.clone();
            merged = Some(updated);
          }
          break;
        }
      }
    }
    if merged.is_none() {
      // Not in the view; merge against the cached copy instead.
      merged = self.store.get::<T>().ok().and_then(|cached| {
        cached
          .into_iter()
          .map(|c| c.record)
          .find(|r| r.id() == id)
          .and_then(|r| merge_record(&r, &patch))
      });
    }
    match &merged {
      Some(record) => {
        if let Err(err) = self.store.save(std::slice::from_ref(record)) {
          warn!("could not cache the updated {} record: {err}", T::kind());
          self
            .notices
            .publish(Notice::error("Error", "Failed to update record"));
        }
      }
      None => debug!("no cached {} record with id {id} to update", T::kind()),
    }

    if self.connectivity.is_online() {
      if let Err(err) = self.remote.update(T::kind(), id, patch).await {
        warn!("remote update for {} failed: {err}", T::kind());
        self
          .notices
          .publish(Notice::error("Error", "Failed to update record"));
      }
    } else {
      // Queued updates carry the id inside the payload; the replay pass
      // splits it back out as the match key.
      let mut queued = patch;
      if let Some(map) = queued.as_object_mut() {
        map.insert("id".into(), Value::String(id.to_string()));
      }
      match self.store.add_to_sync_queue(Operation::Update, T::kind(), &queued) {
        Ok(_) => self.notices.publish(Notice::info(
          "Saved Offline",
          "Your changes will sync when connection returns.",
        )),
        Err(err) => {
          warn!("could not queue the offline update for {}: {err}", T::kind());
          self
            .notices
            .publish(Notice::error("Error", "Failed to update record"));
        }
      }
    }
  }

  /// Replay queued mutations now. Returns `None` while offline; syncing
  /// waits for the connection to come back.
  pub async fn sync_pending_changes(&self) -> Option<ReplayReport> {
    if !self.connectivity.is_online() {
      debug!("offline, leaving the sync queue for the next reconnect");
      return None;
    }
    let report = self.engine.replay_pending().await;
    if report.is_clean() {
      // The engine already mirrored the remote into the cache; pick it up.
      self.fetch_cached();
    }
    Some(report)
  }

  /// React to gateway messages: a `SyncData` broadcast triggers a replay,
  /// the way a page reacts to its worker's sync message.
  pub fn spawn_worker_listener(
    self: &Arc<Self>,
    mut messages: broadcast::Receiver<WorkerMessage>,
  ) -> JoinHandle<()> {
    let accessor = Arc::clone(self);
    tokio::spawn(async move {
      loop {
        match messages.recv().await {
          Ok(WorkerMessage::SyncData) => {
            accessor.sync_pending_changes().await;
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!("worker listener lagged, {skipped} messages skipped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }

  fn fetch_cached(&self) -> Vec<T> {
    match self.store.get::<T>() {
      Ok(cached) => {
        let records: Vec<T> = cached.into_iter().map(|c| c.record).collect();
        self.replace_view(records.clone());
        records
      }
      Err(err) => {
        warn!("could not read cached {}: {err}", T::kind());
        self.notices.publish(Notice::error(
          "Data Error",
          "Unable to load data. Please check your connection.",
        ));
        Vec::new()
      }
    }
  }

  fn replace_view(&self, records: Vec<T>) {
    *self.write_view() = records;
  }

  fn read_view(&self) -> RwLockReadGuard<'_, Vec<T>> {
    self.view.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write_view(&self) -> RwLockWriteGuard<'_, Vec<T>> {
    self.view.write().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Decode remote rows into typed records, preserving order. Undecodable rows
/// are dropped.
fn decode_rows<T: Record>(rows: Vec<Value>) -> Vec<T> {
  rows
    .into_iter()
    .filter_map(|row| match serde_json::from_value(row) {
      Ok(record) => Some(record),
      Err(err) => {
        debug!("dropping undecodable {} row: {err}", T::kind());
        None
      }
    })
    .collect()
}

/// Shallow-merge a patch object into a record, last write wins per field.
/// `None` when the merged document no longer decodes as the record type.
fn merge_record<T: Record>(record: &T, patch: &Value) -> Option<T> {
  let mut row = serde_json::to_value(record).ok()?;
  let (Value::Object(target), Value::Object(fields)) = (&mut row, patch) else {
    return None;
  };
  for (key, value) in fields {
    target.insert(key.clone(), value.clone());
  }
  serde_json::from_value(row).ok()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::entities::{EntityKind, SalesRecord};
  use crate::remote::testing::{MockRemote, RemoteCall};

  struct Harness {
    remote: Arc<MockRemote>,
    store: Arc<OfflineStore>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    notices: Notifier,
  }

  impl Harness {
    fn new(online: bool) -> Self {
      let notices = Notifier::new();
      let remote = Arc::new(MockRemote::new());
      let store = Arc::new(OfflineStore::open_in_memory().unwrap());
      let monitor = Arc::new(ConnectivityMonitor::new(online, notices.clone()));
      let engine = Arc::new(SyncEngine::new(
        store.clone(),
        remote.clone() as Arc<dyn RemoteService>,
        notices.clone(),
      ));
      Self {
        remote,
        store,
        monitor,
        engine,
        notices,
      }
    }

    fn accessor<T: Record>(&self) -> Arc<DataAccessor<T>> {
      Arc::new(DataAccessor::new(
        self.remote.clone() as Arc<dyn RemoteService>,
        self.store.clone(),
        self.monitor.clone(),
        self.engine.clone(),
        self.notices.clone(),
      ))
    }
  }

  fn sale(product: &str) -> SalesRecord {
    SalesRecord {
      date: "2024-06-01".into(),
      product_type: product.into(),
      quantity: 5.0,
      amount: 300.0,
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn online_fetch_mirrors_rows_into_the_cache() {
    let harness = Harness::new(true);
    harness.remote.set_rows(
      EntityKind::SalesRecords,
      vec![
        json!({"id": "s2", "date": "2024-06-02", "product_type": "eggs", "quantity": 2.0, "amount": 60.0}),
        json!({"id": "s1", "date": "2024-06-01", "product_type": "milk", "quantity": 5.0, "amount": 300.0}),
      ],
    );
    let accessor = harness.accessor::<SalesRecord>();

    let records = accessor.fetch().await;
    assert_eq!(records.len(), 2);
    // Remote order (newest first) is preserved in the view.
    assert_eq!(records[0].id, "s2");
    assert_eq!(accessor.records()[0].id, "s2");

    let cached = harness.store.get::<SalesRecord>().unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|c| c.synced));
  }

  #[tokio::test]
  async fn offline_fetch_never_touches_the_remote() {
    let harness = Harness::new(false);
    harness
      .store
      .save(&[SalesRecord {
        id: "s1".into(),
        ..sale("milk")
      }])
      .unwrap();
    let accessor = harness.accessor::<SalesRecord>();

    let records = accessor.fetch().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "s1");
    assert!(harness.remote.calls().is_empty());
  }

  #[tokio::test]
  async fn failed_remote_fetch_falls_back_to_the_cache() {
    let harness = Harness::new(true);
    harness
      .store
      .save(&[SalesRecord {
        id: "s1".into(),
        ..sale("milk")
      }])
      .unwrap();
    harness.remote.set_unreachable(true);
    let mut rx = harness.notices.subscribe();
    let accessor = harness.accessor::<SalesRecord>();

    let records = accessor.fetch().await;
    assert_eq!(records.len(), 1);
    assert_eq!(rx.recv().await.unwrap().title, "Connection Error");
  }

  #[tokio::test]
  async fn add_is_visible_before_any_network_outcome() {
    let harness = Harness::new(false);
    let accessor = harness.accessor::<SalesRecord>();

    let stamped = accessor.add(sale("milk")).await;
    assert!(!stamped.id.is_empty());
    assert!(!stamped.created_at.is_empty());

    let view = accessor.records();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0], stamped);
    let cached = harness.store.get::<SalesRecord>().unwrap();
    assert_eq!(cached.len(), 1);
  }

  #[tokio::test]
  async fn offline_add_queues_an_insert() {
    let harness = Harness::new(false);
    let mut rx = harness.notices.subscribe();
    let accessor = harness.accessor::<SalesRecord>();

    let stamped = accessor.add(sale("milk")).await;

    assert!(harness.remote.calls().is_empty());
    let queue = harness.store.get_sync_queue().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].operation, Operation::Insert);
    assert_eq!(queue[0].table, EntityKind::SalesRecords);
    assert_eq!(queue[0].data["id"], stamped.id.as_str());
    assert_eq!(rx.recv().await.unwrap().title, "Saved Offline");
  }

  #[tokio::test]
  async fn online_add_writes_the_remote_and_skips_the_queue() {
    let harness = Harness::new(true);
    let accessor = harness.accessor::<SalesRecord>();

    let stamped = accessor.add(sale("milk")).await;

    assert_eq!(harness.store.pending_sync_count().unwrap(), 0);
    let calls = harness.remote.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
      RemoteCall::Insert(kind, row) => {
        assert_eq!(*kind, EntityKind::SalesRecords);
        assert_eq!(row["id"], stamped.id.as_str());
        assert_eq!(row["product_type"], "milk");
      }
      other => panic!("unexpected call {other:?}"),
    }
  }

  #[tokio::test]
  async fn failed_online_add_keeps_the_optimistic_record() {
    let harness = Harness::new(true);
    harness.remote.set_unreachable(true);
    let mut rx = harness.notices.subscribe();
    let accessor = harness.accessor::<SalesRecord>();

    let stamped = accessor.add(sale("milk")).await;

    // No rollback: the record stays in the view and the cache.
    assert_eq!(accessor.records()[0], stamped);
    assert_eq!(harness.store.get::<SalesRecord>().unwrap().len(), 1);
    assert_eq!(rx.recv().await.unwrap().title, "Error");
  }

  #[tokio::test]
  async fn update_merges_shallowly_and_stamps_updated_at() {
    let harness = Harness::new(true);
    let accessor = harness.accessor::<SalesRecord>();
    let stamped = accessor.add(sale("milk")).await;

    accessor.update(&stamped.id, json!({"quantity": 9.0})).await;

    let view = accessor.records();
    assert_eq!(view[0].quantity, 9.0);
    assert_eq!(view[0].amount, 300.0);

    // The remote patch carries the changed field and the stamp, not the id,
    // and the view holds exactly the stamp the remote received.
    let calls = harness.remote.calls();
    match calls.last().unwrap() {
      RemoteCall::Update(kind, id, patch) => {
        assert_eq!(*kind, EntityKind::SalesRecords);
        assert_eq!(id, &stamped.id);
        assert_eq!(patch["quantity"], 9.0);
        assert!(patch.get("id").is_none());
        assert_eq!(patch["updated_at"], view[0].updated_at.as_str());
      }
      other => panic!("unexpected call {other:?}"),
    }
  }

  #[tokio::test]
  async fn offline_update_queues_the_patch_with_its_id() {
    let harness = Harness::new(false);
    let accessor = harness.accessor::<SalesRecord>();
    let stamped = accessor.add(sale("milk")).await;

    accessor.update(&stamped.id, json!({"amount": 450.0})).await;

    let queue = harness.store.get_sync_queue().unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[1].operation, Operation::Update);
    assert_eq!(queue[1].data["id"], stamped.id.as_str());
    assert_eq!(queue[1].data["amount"], 450.0);
    // The optimistic merge is durable too.
    let cached = harness.store.get::<SalesRecord>().unwrap();
    assert_eq!(cached[0].record.amount, 450.0);
  }

  #[tokio::test]
  async fn sync_pending_changes_is_a_no_op_while_offline() {
    let harness = Harness::new(false);
    let accessor = harness.accessor::<SalesRecord>();
    accessor.add(sale("milk")).await;

    assert!(accessor.sync_pending_changes().await.is_none());
    assert!(harness.remote.calls().is_empty());
    assert_eq!(harness.store.pending_sync_count().unwrap(), 1);
  }

  #[tokio::test]
  async fn offline_writes_replay_on_reconnect() {
    let harness = Harness::new(false);
    let accessor = harness.accessor::<SalesRecord>();
    let stamped = accessor.add(sale("milk")).await;
    assert_eq!(harness.store.pending_sync_count().unwrap(), 1);

    harness.engine.attach_to(&harness.monitor);
    harness.monitor.set_online(true).await;

    let calls = harness.remote.calls();
    match &calls[0] {
      RemoteCall::Insert(kind, row) => {
        assert_eq!(*kind, EntityKind::SalesRecords);
        assert_eq!(row["id"], stamped.id.as_str());
        assert_eq!(row["product_type"], "milk");
        assert_eq!(row["quantity"], 5.0);
        assert_eq!(row["amount"], 300.0);
      }
      other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(harness.store.pending_sync_count().unwrap(), 0);
  }

  #[tokio::test]
  async fn worker_sync_message_triggers_a_replay() {
    let harness = Harness::new(true);
    let accessor = harness.accessor::<SalesRecord>();
    harness
      .store
      .add_to_sync_queue(
        Operation::Insert,
        EntityKind::SalesRecords,
        &json!({"id": "s1", "product_type": "milk"}),
      )
      .unwrap();

    let (tx, rx) = broadcast::channel(4);
    let handle = accessor.spawn_worker_listener(rx);
    tx.send(WorkerMessage::SyncData).unwrap();

    // Give the listener a moment to drain the message.
    for _ in 0..50 {
      if harness.store.pending_sync_count().unwrap() == 0 {
        break;
      }
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(harness.store.pending_sync_count().unwrap(), 0);
    handle.abort();
  }
}
