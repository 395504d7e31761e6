//! Reconciliation: replaying queued mutations once connectivity returns.
//!
//! A pass walks the queue sequentially in insertion order so the remote sees
//! mutations in the order they were made. Within a pass an entry is either
//! still waiting, replayed, or the failure that aborted the pass; there is no
//! per-entry retry state. The first failure leaves the whole queue intact and
//! the queue is cleared only after a pass in which every entry succeeded.
//! Entries carry no idempotency token, so an entry that succeeded before an
//! aborted pass is sent again on the next one and the remote may end up with
//! duplicate inserts.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::entities::EntityKind;
use crate::error::{RemoteError, SyncReplayError};
use crate::notice::{Notice, Notifier};
use crate::remote::RemoteService;
use crate::store::{OfflineStore, Operation, QueueEntry};

/// Outcome of one replay pass.
#[derive(Debug, Clone)]
pub struct ReplayReport {
  /// Entries replayed successfully this pass.
  pub replayed: usize,
  /// Entries still queued after the pass.
  pub pending: usize,
  /// The failure that aborted the pass, if any.
  pub failure: Option<SyncReplayError>,
}

impl ReplayReport {
  fn empty() -> Self {
    Self {
      replayed: 0,
      pending: 0,
      failure: None,
    }
  }

  /// True when the pass finished with nothing left queued.
  pub fn is_clean(&self) -> bool {
    self.failure.is_none() && self.pending == 0
  }
}

/// Replays the pending-mutation queue against the remote service.
pub struct SyncEngine {
  store: Arc<OfflineStore>,
  remote: Arc<dyn RemoteService>,
  notices: Notifier,
}

impl SyncEngine {
  pub fn new(store: Arc<OfflineStore>, remote: Arc<dyn RemoteService>, notices: Notifier) -> Self {
    Self {
      store,
      remote,
      notices,
    }
  }

  /// Run a replay pass on every reconnect the monitor reports.
  pub fn attach_to(self: &Arc<Self>, monitor: &ConnectivityMonitor) {
    let engine = Arc::clone(self);
    monitor.on_reconnect(move || {
      let engine = Arc::clone(&engine);
      async move {
        engine.replay_pending().await;
      }
    });
  }

  /// Replay every queued mutation in insertion order.
  ///
  /// Never fails: a queue that cannot be read is reported as an empty pass
  /// and retried on the next trigger, and a replay failure comes back inside
  /// the report.
  pub async fn replay_pending(&self) -> ReplayReport {
    let entries = match self.store.get_sync_queue() {
      Ok(entries) => entries,
      Err(err) => {
        warn!("could not read the sync queue: {err}");
        return ReplayReport::empty();
      }
    };
    if entries.is_empty() {
      return ReplayReport::empty();
    }

    info!("replaying {} queued mutations", entries.len());
    let total = entries.len();
    let mut replayed = 0usize;

    for entry in &entries {
      if let Err(err) = self.replay_entry(entry).await {
        let failure = SyncReplayError {
          entry_id: entry.id,
          table: entry.table,
          source: err,
        };
        warn!("sync pass aborted: {failure}");
        self.notices.publish(Notice::error(
          "Sync Failed",
          "Some changes couldn't be synced. Will retry later.",
        ));
        return ReplayReport {
          replayed,
          pending: total - replayed,
          failure: Some(failure),
        };
      }
      replayed += 1;
    }

    self.refresh_touched_kinds(&entries).await;

    let pending = match self.store.clear_sync_queue() {
      Ok(()) => 0,
      Err(err) => {
        // The replayed entries stay queued and will be sent again next
        // pass; the remote sees duplicates rather than lost data.
        warn!("replayed {replayed} mutations but could not clear the queue: {err}");
        self
          .store
          .pending_sync_count()
          .map(|count| count as usize)
          .unwrap_or(replayed)
      }
    };
    if pending == 0 {
      info!("sync pass complete, {replayed} mutations replayed");
      self.notices.publish(Notice::info(
        "Sync Complete",
        "All offline changes have been synced.",
      ));
    } else {
      self.notices.publish(Notice::warning(
        "Sync Incomplete",
        "Your changes were synced but may be re-sent later.",
      ));
    }
    ReplayReport {
      replayed,
      pending,
      failure: None,
    }
  }

  async fn replay_entry(&self, entry: &QueueEntry) -> Result<(), RemoteError> {
    match entry.operation {
      Operation::Insert => self.remote.insert(entry.table, entry.data.clone()).await,
      Operation::Update => {
        let (id, patch) = split_update_payload(&entry.data);
        let Some(id) = id else {
          // An update queued without an id can never match a row; skip it
          // rather than wedging the queue forever.
          warn!("queued update for {} has no id, skipping", entry.table);
          return Ok(());
        };
        self.remote.update(entry.table, &id, patch).await
      }
    }
  }

  /// Mirror the remote state of every kind touched by the pass back into the
  /// local cache. Failures here degrade to stale cache entries.
  async fn refresh_touched_kinds(&self, entries: &[QueueEntry]) {
    let mut kinds: Vec<EntityKind> = Vec::new();
    for entry in entries {
      if !kinds.contains(&entry.table) {
        kinds.push(entry.table);
      }
    }
    for kind in kinds {
      match self.remote.select_all(kind).await {
        Ok(rows) => {
          if let Err(err) = self.store.save_raw(kind, &rows) {
            warn!("could not refresh the {kind} cache after sync: {err}");
          }
        }
        Err(err) => warn!("could not re-fetch {kind} after sync: {err}"),
      }
    }
  }
}

/// Split an update payload `{id, ...changed fields}` into the match key and
/// the patch body.
fn split_update_payload(data: &Value) -> (Option<String>, Value) {
  let mut patch = data.clone();
  let id = match patch.as_object_mut() {
    Some(map) => map.remove("id").and_then(|v| v.as_str().map(String::from)),
    None => None,
  };
  (id, patch)
}
