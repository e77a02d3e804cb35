use rusqlite::Connection;

use crate::errors::{HsgError, Result};

/// Apply PRAGMAs tuned for a single-writer, many-reader embedded
/// deployment.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA mmap_size = 268435456;",
    )
    .map_err(|e| HsgError::Persistence(format!("failed to configure connection: {e}")))
}

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id              TEXT PRIMARY KEY,
            tenant          TEXT,
            content         BLOB NOT NULL,
            primary_sector  TEXT NOT NULL,
            tags            TEXT NOT NULL,
            metadata        TEXT NOT NULL,
            segment         INTEGER NOT NULL DEFAULT 0,
            simhash         INTEGER NOT NULL,
            created_at_ms   INTEGER NOT NULL,
            updated_at_ms   INTEGER NOT NULL,
            last_seen_at_ms INTEGER NOT NULL,
            salience        REAL NOT NULL,
            decay_lambda    REAL NOT NULL,
            version         INTEGER NOT NULL,
            dim             INTEGER NOT NULL,
            mean_vector     BLOB NOT NULL,
            compressed_vector BLOB NOT NULL,
            feedback_score  INTEGER NOT NULL DEFAULT 0,
            generated_summary TEXT
         );

         CREATE UNIQUE INDEX IF NOT EXISTS idx_memories_simhash_tenant
             ON memories(simhash, COALESCE(tenant, ''));
         CREATE INDEX IF NOT EXISTS idx_memories_tenant ON memories(tenant);

         CREATE TABLE IF NOT EXISTS vectors (
            memory_id  TEXT NOT NULL,
            sector     TEXT NOT NULL,
            vector     BLOB NOT NULL,
            dim        INTEGER NOT NULL,
            tenant     TEXT,
            metadata   TEXT,
            PRIMARY KEY (memory_id, sector),
            FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE
         );

         CREATE TABLE IF NOT EXISTS waypoints (
            src_id     TEXT NOT NULL,
            dst_id     TEXT NOT NULL,
            tenant     TEXT,
            weight     REAL NOT NULL,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
         );

         -- SQLite treats NULL as distinct in a UNIQUE index, so a plain
         -- PRIMARY KEY(src_id, dst_id, tenant) never conflicts for
         -- untenanted (tenant IS NULL) edges and ins_waypoint's upsert
         -- would append duplicates instead of updating in place. Indexing
         -- on COALESCE(tenant, '') gives untenanted edges one identity.
         CREATE UNIQUE INDEX IF NOT EXISTS idx_waypoints_identity
             ON waypoints(src_id, dst_id, COALESCE(tenant, ''));

         CREATE INDEX IF NOT EXISTS idx_waypoints_src ON waypoints(src_id, tenant);
         ",
    )
    .map_err(|e| HsgError::Persistence(format!("failed to apply schema: {e}")))
}

/// Restrict a path to owner-only permissions on Unix. Best-effort: a
/// failure here is logged, not fatal, since some filesystems (network
/// mounts, some CI sandboxes) reject chmod.
pub fn harden_permissions(path: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                tracing::warn!(?path, error = %e, "failed to restrict database file permissions");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
