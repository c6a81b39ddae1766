use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use infernet_primitives::{InferenceNodeConfig, NodeAddress, NodeSpec, SeedInfo};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::{keys::kv, migrations, DbResult};

/// Which of the three seed slots a seed occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSlot {
    Current,
    Previous,
    Upcoming,
}

impl SeedSlot {
    pub fn kv_key(&self) -> &'static str {
        match self {
            Self::Current => kv::SEED_CURRENT,
            Self::Previous => kv::SEED_PREVIOUS,
            Self::Upcoming => kv::SEED_UPCOMING,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
            Self::Upcoming => "upcoming",
        }
    }
}

/// A prompt payload retained for serving and validation fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub inference_id: String,
    pub prompt_payload: String,
    pub prompt_hash: String,
    pub model: String,
    pub request_timestamp: i64,
    pub stored_by: String,
}

/// Handle to the embedded SQL store. Cheap to clone; all access serializes
/// on the single connection.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (or creates) the database at `path` and runs migrations.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> DbResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // --- kv_config ---

    pub fn kv_get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row("SELECT value_json FROM kv_config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    pub fn kv_put<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        let json = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_config (key, value_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = ?2, updated_at = ?3",
            params![key, json, now],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv_config WHERE key = ?1", [key])?;
        Ok(())
    }

    // --- inference_nodes ---

    pub fn upsert_node(&self, node: &InferenceNodeConfig) -> DbResult<()> {
        let (host, inference_port, poc_port, inference_segment, poc_segment, base_url) =
            match &node.address {
                NodeAddress::HostPorts {
                    host,
                    inference_port,
                    poc_port,
                    inference_segment,
                    poc_segment,
                } => (
                    Some(host.clone()),
                    Some(*inference_port),
                    Some(*poc_port),
                    Some(inference_segment.clone()),
                    Some(poc_segment.clone()),
                    None,
                ),
                NodeAddress::BaseUrl { base_url } => {
                    (None, None, None, None, None, Some(base_url.clone()))
                }
            };

        let models_json = serde_json::to_string(&node.models)?;
        let hardware_json = serde_json::to_string(&node.hardware)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO inference_nodes
                (id, host, inference_segment, inference_port, poc_segment, poc_port,
                 max_concurrent, models_json, hardware_json, base_url, auth_token,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(id) DO UPDATE SET
                host = ?2, inference_segment = ?3, inference_port = ?4,
                poc_segment = ?5, poc_port = ?6, max_concurrent = ?7,
                models_json = ?8, hardware_json = ?9, base_url = ?10,
                auth_token = ?11, updated_at = ?12",
            params![
                node.id,
                host,
                inference_segment,
                inference_port,
                poc_segment,
                poc_port,
                node.max_concurrent,
                models_json,
                hardware_json,
                base_url,
                node.auth_token,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn delete_node(&self, id: &str) -> DbResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM inference_nodes WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    pub fn load_nodes(&self) -> DbResult<Vec<InferenceNodeConfig>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, host, inference_segment, inference_port, poc_segment, poc_port,
                    max_concurrent, models_json, hardware_json, base_url, auth_token
             FROM inference_nodes ORDER BY id",
        )?;

        let specs = stmt.query_map([], |row| {
            Ok(NodeSpec {
                id: row.get(0)?,
                host: row.get(1)?,
                inference_segment: row.get(2)?,
                inference_port: row.get(3)?,
                poc_segment: row.get(4)?,
                poc_port: row.get(5)?,
                max_concurrent: row.get(6)?,
                models: serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
                hardware: serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
                base_url: row.get(9)?,
                auth_token: row.get(10)?,
            })
        })?;

        let mut nodes = Vec::new();
        for spec in specs {
            nodes.push(spec?.into_config()?);
        }
        Ok(nodes)
    }

    // --- seeds ---

    pub fn seed(&self, slot: SeedSlot) -> DbResult<Option<SeedInfo>> {
        self.kv_get(slot.kv_key())
    }

    pub fn set_seed(&self, slot: SeedSlot, seed: &SeedInfo) -> DbResult<()> {
        self.kv_put(slot.kv_key(), seed)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO seed_info (type, seed, epoch_index, signature, claimed, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)
             ON CONFLICT(epoch_index) DO UPDATE SET
                type = ?1, seed = ?2, signature = ?4, claimed = ?5, is_active = 1",
            params![
                slot.type_name(),
                seed.seed,
                seed.epoch_index,
                seed.signature,
                seed.claimed,
            ],
        )?;
        Ok(())
    }

    /// Rotates `upcoming -> current -> previous` in one transaction.
    ///
    /// The old previous seed is retired from its slot (its `seed_info` row
    /// stays, marked inactive); the upcoming slot ends up empty.
    pub fn rotate_seeds(&self) -> DbResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let read = |tx: &rusqlite::Transaction<'_>, key: &str| -> DbResult<Option<SeedInfo>> {
            let raw: Option<String> = tx
                .query_row("SELECT value_json FROM kv_config WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
        };
        let write = |tx: &rusqlite::Transaction<'_>,
                     key: &str,
                     seed: &Option<SeedInfo>|
         -> DbResult<()> {
            let now = Utc::now().to_rfc3339();
            match seed {
                Some(seed) => {
                    let json = serde_json::to_string(seed)?;
                    tx.execute(
                        "INSERT INTO kv_config (key, value_json, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?3)
                         ON CONFLICT(key) DO UPDATE SET value_json = ?2, updated_at = ?3",
                        params![key, json, now],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM kv_config WHERE key = ?1", [key])?;
                }
            }
            Ok(())
        };

        let current = read(&tx, kv::SEED_CURRENT)?;
        let upcoming = read(&tx, kv::SEED_UPCOMING)?;
        let retiring = read(&tx, kv::SEED_PREVIOUS)?;

        write(&tx, kv::SEED_PREVIOUS, &current)?;
        write(&tx, kv::SEED_CURRENT, &upcoming)?;
        write(&tx, kv::SEED_UPCOMING, &None)?;

        if let Some(retired) = retiring {
            tx.execute(
                "UPDATE seed_info SET is_active = 0 WHERE epoch_index = ?1",
                [retired.epoch_index],
            )?;
        }
        for (slot, seed) in [(SeedSlot::Previous, &current), (SeedSlot::Current, &upcoming)] {
            if let Some(seed) = seed {
                tx.execute(
                    "UPDATE seed_info SET type = ?1 WHERE epoch_index = ?2",
                    params![slot.type_name(), seed.epoch_index],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn mark_seed_claimed(&self, epoch_index: u64) -> DbResult<()> {
        if let Some(mut seed) = self.seed(SeedSlot::Previous)? {
            if seed.epoch_index == epoch_index {
                seed.claimed = true;
                self.kv_put(kv::SEED_PREVIOUS, &seed)?;
            }
        }
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE seed_info SET claimed = 1 WHERE epoch_index = ?1",
            [epoch_index],
        )?;
        Ok(())
    }

    // --- inference_prompt_payloads ---

    pub fn store_prompt_payload(&self, payload: &PromptPayload) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO inference_prompt_payloads
                (inference_id, prompt_payload, prompt_hash, model, request_timestamp,
                 stored_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payload.inference_id,
                payload.prompt_payload,
                payload.prompt_hash,
                payload.model,
                payload.request_timestamp,
                payload.stored_by,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_prompt_payload(&self, inference_id: &str) -> DbResult<Option<PromptPayload>> {
        let conn = self.conn.lock();
        let payload = conn
            .query_row(
                "SELECT inference_id, prompt_payload, prompt_hash, model, request_timestamp,
                        stored_by
                 FROM inference_prompt_payloads WHERE inference_id = ?1",
                [inference_id],
                |row| {
                    Ok(PromptPayload {
                        inference_id: row.get(0)?,
                        prompt_payload: row.get(1)?,
                        prompt_hash: row.get(2)?,
                        model: row.get(3)?,
                        request_timestamp: row.get(4)?,
                        stored_by: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use infernet_primitives::ModelConfig;

    use super::*;

    fn node(id: &str) -> InferenceNodeConfig {
        NodeSpec {
            id: id.to_owned(),
            base_url: Some("http://ml0:8080".to_owned()),
            models: BTreeMap::from([("llama-3".to_owned(), ModelConfig::default())]),
            max_concurrent: 2,
            ..Default::default()
        }
        .into_config()
        .unwrap()
    }

    fn seed(epoch: u64, value: i64) -> SeedInfo {
        SeedInfo::new(value, epoch, format!("sig-{epoch}"))
    }

    #[test]
    fn kv_roundtrip_and_overwrite() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.kv_get::<u64>(kv::CURRENT_HEIGHT).unwrap(), None);

        store.kv_put(kv::CURRENT_HEIGHT, &42u64).unwrap();
        assert_eq!(store.kv_get::<u64>(kv::CURRENT_HEIGHT).unwrap(), Some(42));

        store.kv_put(kv::CURRENT_HEIGHT, &43u64).unwrap();
        assert_eq!(store.kv_get::<u64>(kv::CURRENT_HEIGHT).unwrap(), Some(43));
    }

    #[test]
    fn node_upsert_load_delete() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_node(&node("n1")).unwrap();
        store.upsert_node(&node("n0")).unwrap();

        let nodes = store.load_nodes().unwrap();
        assert_eq!(
            nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["n0", "n1"]
        );

        assert!(store.delete_node("n1").unwrap());
        assert!(!store.delete_node("n1").unwrap());
        assert_eq!(store.load_nodes().unwrap().len(), 1);
    }

    #[test]
    fn seed_rotation_moves_all_slots() {
        let store = Store::open_in_memory().unwrap();
        store.set_seed(SeedSlot::Previous, &seed(40, 1)).unwrap();
        store.set_seed(SeedSlot::Current, &seed(41, 2)).unwrap();
        store.set_seed(SeedSlot::Upcoming, &seed(42, 3)).unwrap();

        store.rotate_seeds().unwrap();

        assert_eq!(store.seed(SeedSlot::Previous).unwrap().unwrap().epoch_index, 41);
        assert_eq!(store.seed(SeedSlot::Current).unwrap().unwrap().epoch_index, 42);
        assert_eq!(store.seed(SeedSlot::Upcoming).unwrap(), None);
    }

    #[test]
    fn claim_marks_previous_slot() {
        let store = Store::open_in_memory().unwrap();
        store.set_seed(SeedSlot::Previous, &seed(40, 1)).unwrap();
        store.mark_seed_claimed(40).unwrap();
        assert!(store.seed(SeedSlot::Previous).unwrap().unwrap().claimed);
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = Store::open(&path).unwrap();
            store.upsert_node(&node("n1")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.load_nodes().unwrap().len(), 1);
    }

    #[test]
    fn legacy_seed_backfill_resolves_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE seeds (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    seed INTEGER, epoch_index INTEGER, signature TEXT, claimed INTEGER
                );
                INSERT INTO seeds (seed, epoch_index, signature, claimed)
                    VALUES (1, 40, 'old', 0);
                INSERT INTO seeds (seed, epoch_index, signature, claimed)
                    VALUES (2, 40, 'new', 0);
                INSERT INTO seeds (seed, epoch_index, signature, claimed)
                    VALUES (3, 41, '', 0);",
            )
            .unwrap();
        }

        let store = Store::open(&path).unwrap();
        let conn = store.conn.lock();

        let (seed_value, signature): (i64, String) = conn
            .query_row(
                "SELECT seed, signature FROM seed_info WHERE epoch_index = 40",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((seed_value, signature.as_str()), (2, "new"));

        // empty-signature row dropped
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM seed_info", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        // legacy table kept as backup
        let backup: i64 = conn
            .query_row("SELECT COUNT(*) FROM seeds_backup", [], |row| row.get(0))
            .unwrap();
        assert_eq!(backup, 3);
    }
}
