//! libSQL-backed checkpoint store.

use std::path::Path;

use async_trait::async_trait;
use briefwire_shared::{BriefwireError, Result, RunDate};
use chrono::Utc;
use libsql::{Connection, Database, params};

use crate::migrations;
use crate::{CheckpointKey, CheckpointStore};

/// Checkpoints stored as rows of an embedded libSQL database.
pub struct LibsqlCheckpointStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

fn storage_err(e: libsql::Error) -> BriefwireError {
    BriefwireError::Storage(e.to_string())
}

impl LibsqlCheckpointStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BriefwireError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BriefwireError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl CheckpointStore for LibsqlCheckpointStore {
    async fn put(&self, key: &CheckpointKey, payload: &str) -> Result<()> {
        let date = key.date.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO checkpoints (date, phase, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(date, phase) DO UPDATE SET
                   payload = excluded.payload,
                   updated_at = excluded.updated_at",
                params![date.as_str(), key.phase_token.as_str(), payload, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, key: &CheckpointKey) -> Result<Option<String>> {
        let date = key.date.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM checkpoints WHERE date = ?1 AND phase = ?2",
                params![date.as_str(), key.phase_token.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn contains(&self, key: &CheckpointKey) -> Result<bool> {
        let date = key.date.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM checkpoints WHERE date = ?1 AND phase = ?2",
                params![date.as_str(), key.phase_token.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    async fn list(&self, date: RunDate) -> Result<Vec<String>> {
        let date = date.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT phase FROM checkpoints WHERE date = ?1",
                params![date.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut tokens = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            tokens.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(tokens)
    }

    async fn remove(&self, key: &CheckpointKey) -> Result<()> {
        let date = key.date.to_string();
        self.conn
            .execute(
                "DELETE FROM checkpoints WHERE date = ?1 AND phase = ?2",
                params![date.as_str(), key.phase_token.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use briefwire_shared::PipelinePhase;
    use uuid::Uuid;

    use super::*;

    async fn test_store() -> LibsqlCheckpointStore {
        let tmp = std::env::temp_dir().join(format!("bw_test_{}.db", Uuid::now_v7()));
        LibsqlCheckpointStore::open(&tmp).await.expect("open test db")
    }

    fn date() -> RunDate {
        "2024-06-01".parse().unwrap()
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        assert_eq!(store.schema_version().await, 1);
    }

    #[tokio::test]
    async fn upsert_is_last_writer_wins() {
        let store = test_store().await;
        let key = CheckpointKey::new(date(), PipelinePhase::Enrich);

        assert_eq!(store.get(&key).await.unwrap(), None);
        store.put(&key, "first").await.unwrap();
        store.put(&key, "second").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("second"));
        assert!(store.contains(&key).await.unwrap());
    }

    #[tokio::test]
    async fn list_and_remove() {
        let store = test_store().await;
        let other: RunDate = "2024-06-02".parse().unwrap();
        for phase in [PipelinePhase::Gpt, PipelinePhase::Scrape] {
            store.put(&CheckpointKey::new(date(), phase), "{}").await.unwrap();
        }
        store
            .put(&CheckpointKey::new(other, PipelinePhase::Final), "{}")
            .await
            .unwrap();

        let mut tokens = store.list(date()).await.unwrap();
        tokens.sort();
        assert_eq!(tokens, vec!["gpt", "scrape"]);

        let key = CheckpointKey::new(date(), PipelinePhase::Gpt);
        store.remove(&key).await.unwrap();
        store.remove(&key).await.unwrap();
        assert!(!store.contains(&key).await.unwrap());
        assert_eq!(store.list(other).await.unwrap(), vec!["final"]);
    }
}
