//! Error taxonomy for the sync subsystem.
//!
//! Nothing here is fatal. Every error is caught at the boundary where it
//! occurs, logged, and converted into a user-facing notice; operations degrade
//! to cached data or a retry on the next online transition.

use thiserror::Error;

use crate::entities::EntityKind;

/// The local persistent store is unavailable or a transaction failed.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("cache database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("record serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("cache lock poisoned")]
  LockPoisoned,

  #[error("could not determine data directory")]
  NoDataDir,

  #[error("failed to create cache directory: {0}")]
  CreateDir(#[source] std::io::Error),
}

/// A remote service call failed (network, validation, auth).
///
/// The service signals failures as an error object with a message field;
/// this carries that message and nothing else.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
  pub message: String,
}

impl RemoteError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(err: reqwest::Error) -> Self {
    Self::new(err.to_string())
  }
}

/// A queued mutation failed to replay against the remote service.
///
/// The failure aborts the rest of the replay pass and leaves the queue
/// intact, so entries that already succeeded in the same pass are sent again
/// on the next one.
#[derive(Debug, Clone, Error)]
#[error("replay of queue entry {entry_id} ({table}) failed: {source}")]
pub struct SyncReplayError {
  /// Queue id of the entry that failed.
  pub entry_id: i64,
  /// The entity table the failed mutation targeted.
  pub table: EntityKind,
  #[source]
  pub source: RemoteError,
}
