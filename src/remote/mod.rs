//! Remote data service contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::entities::EntityKind;
use crate::error::RemoteError;

mod rest;

pub use rest::RestClient;

/// The per-table surface of the hosted database service.
///
/// The sync core only needs `select_all`, `insert` and `update`; `delete` is
/// part of the service contract and available to direct callers.
#[async_trait]
pub trait RemoteService: Send + Sync {
  /// All rows of the table, newest first (`created_at` descending).
  async fn select_all(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError>;

  /// Insert one full record row.
  async fn insert(&self, kind: EntityKind, record: Value) -> Result<(), RemoteError>;

  /// Apply a partial patch to the row whose `id` matches. The patch carries
  /// only changed fields; the id travels as the match key, not in the body.
  async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<(), RemoteError>;

  /// Delete the row whose `id` matches.
  async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError>;
}
