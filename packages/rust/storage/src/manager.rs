//! Checkpoint manager: typed phase snapshots over a store backend.

use std::sync::Arc;

use briefwire_shared::{PipelinePhase, Result, RunDate};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{CheckpointKey, CheckpointStore};

/// Typed save/restore of phase outputs over any [`CheckpointStore`].
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Serialize `payload` and store it as the checkpoint of `(date, phase)`,
    /// replacing any earlier one.
    pub async fn save<T: Serialize + Sync>(
        &self,
        date: RunDate,
        phase: PipelinePhase,
        payload: &T,
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(payload)?;
        self.store.put(&CheckpointKey::new(date, phase), &json).await?;
        debug!(%date, %phase, "checkpoint saved");
        Ok(())
    }

    /// Restore the checkpoint of `(date, phase)`.
    ///
    /// A missing checkpoint and one that no longer deserializes both yield
    /// `Ok(None)`; the phase is simply re-run.
    pub async fn load<T: DeserializeOwned>(
        &self,
        date: RunDate,
        phase: PipelinePhase,
    ) -> Result<Option<T>> {
        let Some(raw) = self.store.get(&CheckpointKey::new(date, phase)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(%date, %phase, error = %e, "ignoring corrupt checkpoint");
                Ok(None)
            }
        }
    }

    pub async fn exists(&self, date: RunDate, phase: PipelinePhase) -> Result<bool> {
        self.store.contains(&CheckpointKey::new(date, phase)).await
    }

    /// Phases checkpointed for `date`, in pipeline order. Unknown tokens
    /// are ignored.
    pub async fn list_checkpoints(&self, date: RunDate) -> Result<Vec<PipelinePhase>> {
        let mut phases: Vec<PipelinePhase> = self
            .store
            .list(date)
            .await?
            .iter()
            .filter_map(|token| token.parse().ok())
            .collect();
        phases.sort_by_key(PipelinePhase::order);
        phases.dedup();
        Ok(phases)
    }

    /// Highest-order phase checkpointed for `date`.
    pub async fn latest_phase(&self, date: RunDate) -> Result<Option<PipelinePhase>> {
        Ok(self.list_checkpoints(date).await?.last().copied())
    }

    /// Remove every checkpoint of `date`; returns how many were removed.
    pub async fn clear(&self, date: RunDate) -> Result<usize> {
        let phases = self.list_checkpoints(date).await?;
        for phase in &phases {
            self.store.remove(&CheckpointKey::new(date, *phase)).await?;
        }
        info!(%date, removed = phases.len(), "checkpoints cleared");
        Ok(phases.len())
    }
}
