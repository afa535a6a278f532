//! Checkpointed, resumable execution of the fixed phase order.

use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use briefwire_shared::{
    BriefwireError, PipelinePhase, Result, RunDate, RunState, try_catch_async,
};
use briefwire_storage::CheckpointManager;

use crate::phases::{PhaseContext, PhaseEnv, run_phase};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a phase is checked or executed.
    fn phase_started(&self, phase: PipelinePhase);
    /// Called when a phase is satisfied from its checkpoint.
    fn phase_resumed(&self, phase: PipelinePhase);
    /// Called after a phase ran and its checkpoint was written.
    fn phase_completed(&self, phase: PipelinePhase, state: &RunState);
    /// Called as a phase works through its items.
    fn item(&self, phase: PipelinePhase, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase_started(&self, _phase: PipelinePhase) {}
    fn phase_resumed(&self, _phase: PipelinePhase) {}
    fn phase_completed(&self, _phase: PipelinePhase, _state: &RunState) {}
    fn item(&self, _phase: PipelinePhase, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: RunDate,
    /// Phases whose work ran during this invocation.
    pub executed: Vec<PipelinePhase>,
    /// Phases restored from checkpoints without running.
    pub resumed: Vec<PipelinePhase>,
    pub state: RunState,
    pub elapsed: std::time::Duration,
}

/// Checkpoint position of a run date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub date: RunDate,
    pub completed: Vec<PipelinePhase>,
    pub latest: Option<PipelinePhase>,
    /// Phase the next run would execute first, `None` when complete.
    pub next: Option<PipelinePhase>,
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        self.latest == Some(PipelinePhase::Final)
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Runs the phases in order, restoring completed ones from checkpoints.
pub struct Sequencer {
    checkpoints: CheckpointManager,
    ctx: PhaseContext,
}

impl Sequencer {
    pub fn new(checkpoints: CheckpointManager, ctx: PhaseContext) -> Self {
        Self { checkpoints, ctx }
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run every phase for `date`.
    ///
    /// A phase with a readable checkpoint is not executed; its snapshot
    /// becomes the current state. Otherwise the phase runs and its output is
    /// saved before moving on. A failing phase stops the run without writing
    /// its checkpoint.
    #[instrument(skip_all, fields(date = %date))]
    pub async fn run(&self, date: RunDate, progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        info!(%run_id, "starting pipeline run");

        let env = PhaseEnv {
            ctx: &self.ctx,
            date,
            progress,
        };
        let mut state = RunState::default();
        let mut executed = Vec::new();
        let mut resumed = Vec::new();

        for phase in PipelinePhase::ALL {
            progress.phase_started(phase);

            if self.checkpoints.exists(date, phase).await? {
                match self.checkpoints.load::<RunState>(date, phase).await? {
                    Some(saved) => {
                        info!(%phase, articles = saved.articles.len(), "resumed from checkpoint");
                        state = saved;
                        resumed.push(phase);
                        progress.phase_resumed(phase);
                        continue;
                    }
                    None => warn!(%phase, "checkpoint unreadable, re-running phase"),
                }
            }

            let phase_start = Instant::now();
            state = try_catch_async(run_phase(phase, &env, state))
                .await
                .and_then(|outcome| outcome)
                .map_err(|e| {
                    error!(%phase, code = e.code(), error = %e, "phase failed");
                    BriefwireError::phase_failed(phase.as_str(), e)
                })?;

            self.checkpoints.save(date, phase, &state).await?;
            info!(
                %phase,
                articles = state.articles.len(),
                elapsed_ms = phase_start.elapsed().as_millis() as u64,
                "phase complete"
            );
            executed.push(phase);
            progress.phase_completed(phase, &state);
        }

        let report = RunReport {
            run_id,
            date,
            executed,
            resumed,
            state,
            elapsed: start.elapsed(),
        };
        info!(
            %run_id,
            executed = report.executed.len(),
            resumed = report.resumed.len(),
            articles = report.state.articles.len(),
            "pipeline run complete"
        );
        progress.done(&report);
        Ok(report)
    }

    /// Where the run for `date` stands.
    pub async fn status(&self, date: RunDate) -> Result<RunStatus> {
        run_status(&self.checkpoints, date).await
    }
}

/// Checkpoint position of `date` without building a full sequencer.
pub async fn run_status(checkpoints: &CheckpointManager, date: RunDate) -> Result<RunStatus> {
    let completed = checkpoints.list_checkpoints(date).await?;
    let latest = completed.last().copied();
    let next = match latest {
        Some(phase) => phase.next(),
        None => Some(PipelinePhase::Scrape),
    };
    Ok(RunStatus {
        date,
        completed,
        latest,
        next,
    })
}
