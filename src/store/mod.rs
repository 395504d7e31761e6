//! Durable local cache: entity records plus the pending-mutation queue.
//!
//! Backed by a single SQLite database so the application keeps working with
//! no connectivity at all. Records live in one kind-discriminated table;
//! mutations made while offline are appended to `sync_queue` and replayed in
//! insertion order by the sync engine.

mod queue;
mod schema;
mod storage;

pub use queue::{Operation, QueueEntry};
pub use storage::{CachedRecord, OfflineStore};
