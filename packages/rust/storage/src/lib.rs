//! Checkpoint persistence for pipeline runs.
//!
//! A checkpoint is the serialized output of one completed phase, keyed by
//! `(run date, phase)`. Backends implement the small [`CheckpointStore`]
//! key-value trait; [`CheckpointManager`] adds typed payloads, corrupt-entry
//! handling and pipeline ordering on top.
//!
//! - [`FsCheckpointStore`]: one pretty-printed JSON file per key under a base
//!   directory (`{date}_{phase}.json`), human-diffable.
//! - [`LibsqlCheckpointStore`]: an embedded libSQL database.

mod fs;
mod libsql_store;
mod manager;
mod migrations;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use briefwire_shared::{AppConfig, BriefwireError, PipelinePhase, Result, RunDate};

pub use fs::FsCheckpointStore;
pub use libsql_store::LibsqlCheckpointStore;
pub use manager::CheckpointManager;

/// File name of the libSQL checkpoint database inside `checkpoint_dir`.
pub const CHECKPOINT_DB_FILE: &str = "checkpoints.db";

/// Address of one checkpoint.
///
/// The phase is kept as its raw token so a backend can report entries it
/// does not recognise; the manager filters those out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub date: RunDate,
    pub phase_token: String,
}

impl CheckpointKey {
    pub fn new(date: RunDate, phase: PipelinePhase) -> Self {
        Self {
            date,
            phase_token: phase.as_str().to_string(),
        }
    }

    /// `{date}_{phase}` stem shared by every backend.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.date, self.phase_token)
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Key-value storage for serialized checkpoint payloads.
///
/// `put` replaces any existing payload for the key in one step: readers see
/// either the old or the new payload, never a partial one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn put(&self, key: &CheckpointKey, payload: &str) -> Result<()>;

    /// `Ok(None)` when no payload exists for the key.
    async fn get(&self, key: &CheckpointKey) -> Result<Option<String>>;

    async fn contains(&self, key: &CheckpointKey) -> Result<bool>;

    /// Phase tokens stored for `date`, in no particular order.
    async fn list(&self, date: RunDate) -> Result<Vec<String>>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &CheckpointKey) -> Result<()>;
}

/// Open the backend selected by `defaults.checkpoint_backend`.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>> {
    let dir = PathBuf::from(&config.defaults.checkpoint_dir);
    match config.defaults.checkpoint_backend.as_str() {
        "fs" => Ok(Arc::new(FsCheckpointStore::new(dir))),
        "libsql" => {
            let store = LibsqlCheckpointStore::open(&dir.join(CHECKPOINT_DB_FILE)).await?;
            Ok(Arc::new(store))
        }
        other => Err(BriefwireError::config(format!(
            "unknown checkpoint backend '{other}' (expected 'fs' or 'libsql')"
        ))),
    }
}
