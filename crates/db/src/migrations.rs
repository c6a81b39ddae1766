//! Schema creation and idempotent migrations.

use rusqlite::Connection;
use tracing::info;

use crate::DbResult;

pub(crate) fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS inference_nodes (
            id TEXT PRIMARY KEY,
            host TEXT,
            inference_segment TEXT,
            inference_port INTEGER,
            poc_segment TEXT,
            poc_port INTEGER,
            max_concurrent INTEGER NOT NULL,
            models_json TEXT NOT NULL,
            hardware_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv_config (
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS seed_info (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            seed INTEGER NOT NULL,
            epoch_index INTEGER NOT NULL,
            signature TEXT NOT NULL,
            claimed INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE UNIQUE INDEX IF NOT EXISTS seed_info_epoch_idx
            ON seed_info (epoch_index);

        CREATE TABLE IF NOT EXISTS inference_prompt_payloads (
            inference_id TEXT PRIMARY KEY,
            prompt_payload TEXT NOT NULL,
            prompt_hash TEXT NOT NULL,
            model TEXT NOT NULL,
            request_timestamp INTEGER NOT NULL,
            stored_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;

    add_column_if_missing(conn, "inference_nodes", "base_url", "TEXT")?;
    add_column_if_missing(conn, "inference_nodes", "auth_token", "TEXT")?;

    backfill_legacy_seeds(conn)?;

    Ok(())
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    col_type: &str,
) -> DbResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    if !existing.iter().any(|name| name == column) {
        conn.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {col_type}"),
            [],
        )?;
        info!(table, column, "added missing column");
    }
    Ok(())
}

/// One-shot backfill from the legacy `seeds` table.
///
/// Duplicates per epoch resolve to the latest row id; rows with an empty
/// signature are dropped. The legacy table is kept as `seeds_backup`.
fn backfill_legacy_seeds(conn: &Connection) -> DbResult<()> {
    let legacy_exists: bool = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'seeds'",
        [],
        |row| row.get::<_, i64>(0).map(|n| n > 0),
    )?;
    if !legacy_exists {
        return Ok(());
    }

    let already_filled: bool = conn.query_row("SELECT COUNT(*) FROM seed_info", [], |row| {
        row.get::<_, i64>(0).map(|n| n > 0)
    })?;

    if !already_filled {
        let migrated = conn.execute(
            "INSERT INTO seed_info (type, seed, epoch_index, signature, claimed, is_active)
             SELECT 'migrated', seed, epoch_index, signature, COALESCE(claimed, 0), 1
             FROM seeds
             WHERE signature <> ''
               AND id IN (SELECT MAX(id) FROM seeds GROUP BY epoch_index)",
            [],
        )?;
        info!(migrated, "backfilled seed_info from legacy seeds table");
    }

    conn.execute_batch(
        "DROP TABLE IF EXISTS seeds_backup;
         ALTER TABLE seeds RENAME TO seeds_backup;",
    )?;

    Ok(())
}
