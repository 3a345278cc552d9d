//! Persistence boundary for debates.
//!
//! The orchestrator only needs atomic read-modify-write on a single debate
//! record and append-only message writes, so the trait is small and storage
//! engines stay swappable. `SqliteStore` is the durable default: a single
//! file, the aggregate stored as a JSON document with indexed owner/status
//! columns. `MemoryStore` backs tests and ephemeral runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{DebateError, Result};
use crate::types::{Debate, DebateStatus};

/// Mutation applied under the store's atomicity guarantee.
pub type Mutation = Box<dyn FnOnce(&mut Debate) -> Result<()> + Send>;

#[async_trait]
pub trait DebateStore: Send + Sync {
    async fn insert(&self, debate: Debate) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Option<Debate>>;

    /// Atomic read-modify-write: load, mutate, persist, return the result.
    /// The mutation's error aborts the write.
    async fn update(&self, id: &str, mutation: Mutation) -> Result<Debate>;

    async fn delete(&self, id: &str) -> Result<bool>;

    async fn list_for_owner(
        &self,
        owner_id: &str,
        status: Option<DebateStatus>,
    ) -> Result<Vec<Debate>>;
}

/// In-memory store. Debates belonging to different owners share nothing but
/// the map lock, which is never held across an await point.
#[derive(Default)]
pub struct MemoryStore {
    debates: Mutex<HashMap<String, Debate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DebateStore for MemoryStore {
    async fn insert(&self, debate: Debate) -> Result<()> {
        self.debates
            .lock()
            .expect("store lock")
            .insert(debate.id.clone(), debate);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Debate>> {
        Ok(self.debates.lock().expect("store lock").get(id).cloned())
    }

    async fn update(&self, id: &str, mutation: Mutation) -> Result<Debate> {
        let mut debates = self.debates.lock().expect("store lock");
        let debate = debates
            .get_mut(id)
            .ok_or_else(|| DebateError::NotFound(id.to_string()))?;
        mutation(debate)?;
        Ok(debate.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self
            .debates
            .lock()
            .expect("store lock")
            .remove(id)
            .is_some())
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        status: Option<DebateStatus>,
    ) -> Result<Vec<Debate>> {
        let debates = self.debates.lock().expect("store lock");
        let mut result: Vec<Debate> = debates
            .values()
            .filter(|d| d.owner_id == owner_id)
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }
}

const SCHEMA: &str = r#"
-- Debates: one row per aggregate, the document itself as JSON
CREATE TABLE IF NOT EXISTS debates (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    status TEXT NOT NULL,
    debate_json TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_debates_owner ON debates(owner_id);
CREATE INDEX IF NOT EXISTS idx_debates_status ON debates(status);
"#;

/// SQLite-backed store. One connection guarded by a mutex: every update is
/// a single locked read-modify-write, which is all the atomicity the
/// orchestrator assumes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open debate store at {:?}", path))?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize debate store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize debate store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_debate(json: &str) -> Result<Debate> {
        let debate =
            serde_json::from_str(json).context("Failed to decode stored debate document")?;
        Ok(debate)
    }
}

#[async_trait]
impl DebateStore for SqliteStore {
    async fn insert(&self, debate: Debate) -> Result<()> {
        let json = serde_json::to_string(&debate).context("Failed to encode debate")?;
        let conn = self.conn.lock().expect("store lock");
        conn.execute(
            "INSERT OR REPLACE INTO debates (id, owner_id, status, debate_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                debate.id,
                debate.owner_id,
                debate.status.name(),
                json,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to insert debate")?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Debate>> {
        let conn = self.conn.lock().expect("store lock");
        let json: Option<String> = conn
            .query_row(
                "SELECT debate_json FROM debates WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("Failed to load debate")?;
        json.as_deref().map(Self::row_to_debate).transpose()
    }

    async fn update(&self, id: &str, mutation: Mutation) -> Result<Debate> {
        let conn = self.conn.lock().expect("store lock");
        let json: String = conn
            .query_row(
                "SELECT debate_json FROM debates WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DebateError::NotFound(id.to_string()),
                other => DebateError::Store(other.into()),
            })?;

        let mut debate = Self::row_to_debate(&json)?;
        mutation(&mut debate)?;

        let updated = serde_json::to_string(&debate).context("Failed to encode debate")?;
        conn.execute(
            "UPDATE debates SET status = ?2, debate_json = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                debate.id,
                debate.status.name(),
                updated,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to persist debate update")?;
        Ok(debate)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("store lock");
        let removed = conn
            .execute("DELETE FROM debates WHERE id = ?1", [id])
            .context("Failed to delete debate")?;
        Ok(removed > 0)
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        status: Option<DebateStatus>,
    ) -> Result<Vec<Debate>> {
        let conn = self.conn.lock().expect("store lock");
        let mut debates = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT debate_json FROM debates
                         WHERE owner_id = ?1 AND status = ?2 ORDER BY created_at",
                    )
                    .context("Failed to prepare list query")?;
                let rows = stmt
                    .query_map(params![owner_id, status.name()], |row| {
                        row.get::<_, String>(0)
                    })
                    .context("Failed to list debates")?;
                for row in rows {
                    debates.push(Self::row_to_debate(&row.context("Row error")?)?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT debate_json FROM debates
                         WHERE owner_id = ?1 ORDER BY created_at",
                    )
                    .context("Failed to prepare list query")?;
                let rows = stmt
                    .query_map(params![owner_id], |row| row.get::<_, String>(0))
                    .context("Failed to list debates")?;
                for row in rows {
                    debates.push(Self::row_to_debate(&row.context("Row error")?)?);
                }
            }
        }
        Ok(debates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn exercise_store(store: &dyn DebateStore) {
        let debate = Debate::new("user-1", "Should we expand into the new market?");
        let id = debate.id.clone();

        store.insert(debate).await.unwrap();
        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DebateStatus::Draft);

        let updated = store
            .update(
                &id,
                Box::new(|d| {
                    d.status = DebateStatus::Pending;
                    Ok(())
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, DebateStatus::Pending);

        let listed = store
            .list_for_owner("user-1", Some(DebateStatus::Pending))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let empty = store
            .list_for_owner("user-1", Some(DebateStatus::Completed))
            .await
            .unwrap();
        assert!(empty.is_empty());

        let foreign = store.list_for_owner("user-2", None).await.unwrap();
        assert!(foreign.is_empty());

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        exercise_store(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("debates.db")).unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_update_missing_debate_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("missing", Box::new(|_| Ok(())))
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_mutation_aborts_sqlite_write() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debate = Debate::new("user-1", "Should we expand into the new market?");
        let id = debate.id.clone();
        store.insert(debate).await.unwrap();

        let err = store
            .update(
                &id,
                Box::new(|d| {
                    d.status = DebateStatus::Failed;
                    Err(DebateError::InvalidState("boom".into()))
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::InvalidState(_)));

        let reloaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DebateStatus::Draft);
    }
}
