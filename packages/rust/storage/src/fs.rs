//! Filesystem checkpoint store: one JSON file per date and phase.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use briefwire_shared::{BriefwireError, Result, RunDate};
use tracing::debug;
use uuid::Uuid;

use crate::{CheckpointKey, CheckpointStore};

const EXTENSION: &str = "json";

/// Checkpoints as `{base_dir}/{date}_{phase}.json` files.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    base_dir: PathBuf,
}

impl FsCheckpointStore {
    /// The directory is created lazily on the first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.base_dir.join(format!("{}.{EXTENSION}", key.stem()))
    }
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn put(&self, key: &CheckpointKey, payload: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| BriefwireError::io(&self.base_dir, e))?;

        let path = self.path_for(key);
        let tmp = self
            .base_dir
            .join(format!(".{}.{}.tmp", key.stem(), Uuid::now_v7()));

        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| BriefwireError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BriefwireError::io(&path, e));
        }

        debug!(path = %path.display(), bytes = payload.len(), "checkpoint written");
        Ok(())
    }

    async fn get(&self, key: &CheckpointKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BriefwireError::io(&path, e)),
        }
    }

    async fn contains(&self, key: &CheckpointKey) -> Result<bool> {
        let path = self.path_for(key);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| BriefwireError::io(&path, e))
    }

    async fn list(&self, date: RunDate) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BriefwireError::io(&self.base_dir, e)),
        };

        let prefix = format!("{date}_");
        let suffix = format!(".{EXTENSION}");
        let mut tokens = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BriefwireError::io(&self.base_dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(token) = name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            {
                tokens.push(token.to_string());
            }
        }
        Ok(tokens)
    }

    async fn remove(&self, key: &CheckpointKey) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BriefwireError::io(&path, e)),
        }
    }
}
