//! Cache database schema.

/// Bump when the schema changes. The whole schema is applied in one
/// transaction the first time a database at an older version is opened.
pub(crate) const SCHEMA_VERSION: i32 = 1;

pub(crate) const SCHEMA: &str = "
-- One logical table per entity kind, discriminated by `kind`.
-- `data` is the full record as JSON; the envelope columns are denormalized
-- for indexing.
CREATE TABLE IF NOT EXISTS records (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    synced INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_records_synced ON records(kind, synced);
CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(kind, updated_at);

-- Mutations made while offline, replayed in id order on reconnect.
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL,
    kind TEXT NOT NULL,
    data BLOB NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp);
CREATE INDEX IF NOT EXISTS idx_sync_queue_operation ON sync_queue(operation);
";
