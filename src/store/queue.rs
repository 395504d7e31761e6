//! Pending-mutation queue types.

use serde::{Deserialize, Serialize};

use crate::entities::EntityKind;

/// What a queued mutation does when replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
  Insert,
  Update,
}

impl Operation {
  /// Wire/storage spelling.
  pub fn as_str(self) -> &'static str {
    match self {
      Operation::Insert => "INSERT",
      Operation::Update => "UPDATE",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "INSERT" => Some(Operation::Insert),
      "UPDATE" => Some(Operation::Update),
      _ => None,
    }
  }
}

impl std::fmt::Display for Operation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One pending mutation recorded while the application was offline.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
  /// Auto-assigned queue id; replay order is ascending id.
  pub id: i64,
  pub operation: Operation,
  /// The entity table the mutation targets.
  pub table: EntityKind,
  /// Full record payload for an insert; `{id, ...changed fields}` for an
  /// update.
  pub data: serde_json::Value,
  /// ISO-8601 time the entry was queued. Informational; ordering uses `id`.
  pub timestamp: String,
}
