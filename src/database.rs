//! Database module for the vault-consul-role library
//!
//! This module implements the SQLite-based persistence layer that records
//! which roles are managed and what they looked like when last read.
//!
//! Architectural role:
//! - Provides persistence for role records keyed by role path
//! - Should be accessed through the manager module rather than directly
//! - Manages connection pooling and transaction handling

use log::{debug, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::vault::RoleState;

/// Database connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to (de)serialize role state: {0}")]
    Json(#[from] serde_json::Error),
}

/// SQLite store of role records.
#[derive(Clone)]
pub struct StateStore {
    pool: Arc<DbPool>,
}

impl StateStore {
    /// Opens (creating if needed) the state database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self, StateError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::new(manager)?;
        Self::from_pool(pool)
    }

    /// A private in-memory store. The pool holds a single connection so every
    /// caller sees the same database.
    pub fn in_memory() -> Result<Self, StateError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: DbPool) -> Result<Self, StateError> {
        let connection = pool.get()?;
        Self::init_database(&connection)?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn init_database(conn: &DbConnection) -> Result<(), StateError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS consul_roles (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL
            )",
            [],
        )?;
        debug!("State database initialized");
        Ok(())
    }

    /// Inserts or replaces the record stored under `state.id`.
    pub fn save(&self, state: &RoleState) -> Result<(), StateError> {
        let conn = self.pool.get()?;
        let json = serde_json::to_string(state)?;
        conn.execute(
            "INSERT OR REPLACE INTO consul_roles (id, state) VALUES (?, ?)",
            params![state.id, json],
        )?;
        debug!("Saved role state for {}", state.id);
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<RoleState>, StateError> {
        let conn = self.pool.get()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state FROM consul_roles WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Removes the record for `id`. Returns whether one existed.
    pub fn remove(&self, id: &str) -> Result<bool, StateError> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM consul_roles WHERE id = ?", params![id])?;
        if removed > 0 {
            info!("Removed role {} from state", id);
        }
        Ok(removed > 0)
    }

    /// All records, ordered by ID.
    pub fn list(&self) -> Result<Vec<RoleState>, StateError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT state FROM consul_roles ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut states = Vec::new();
        for row in rows {
            states.push(serde_json::from_str(&row?)?);
        }
        Ok(states)
    }

    /// Moves the record stored under `old_id` to `state.id` in one transaction.
    pub fn replace_id(&self, old_id: &str, state: &RoleState) -> Result<(), StateError> {
        let mut conn = self.pool.get()?;
        let json = serde_json::to_string(state)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM consul_roles WHERE id = ?", params![old_id])?;
        tx.execute(
            "INSERT OR REPLACE INTO consul_roles (id, state) VALUES (?, ?)",
            params![state.id, json],
        )?;
        tx.commit()?;
        info!("Rewrote role ID {} to {}", old_id, state.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(id: &str) -> RoleState {
        RoleState {
            name: "web".to_string(),
            backend: Some("consul".to_string()),
            policies: vec!["read".to_string()],
            ..RoleState::with_id(id)
        }
    }

    #[test]
    fn save_load_and_remove() {
        let store = StateStore::in_memory().unwrap();
        store.save(&state("consul/roles/web")).unwrap();

        let loaded = store.load("consul/roles/web").unwrap().unwrap();
        assert_eq!(loaded, state("consul/roles/web"));
        assert!(store.load("consul/roles/other").unwrap().is_none());

        assert!(store.remove("consul/roles/web").unwrap());
        assert!(!store.remove("consul/roles/web").unwrap());
        assert!(store.load("consul/roles/web").unwrap().is_none());
    }

    #[test]
    fn replace_id_moves_record() {
        let store = StateStore::in_memory().unwrap();
        store.save(&state("consul,web")).unwrap();

        store
            .replace_id("consul,web", &state("consul/roles/web"))
            .unwrap();

        assert!(store.load("consul,web").unwrap().is_none());
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["consul/roles/web"]);
    }

    #[test]
    fn records_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_str().unwrap();

        {
            let store = StateStore::new(path).unwrap();
            store.save(&state("consul/roles/a")).unwrap();
            store.save(&state("consul/roles/b")).unwrap();
        }

        let store = StateStore::new(path).unwrap();
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["consul/roles/a", "consul/roles/b"]);
    }
}
