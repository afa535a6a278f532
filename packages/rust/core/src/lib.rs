//! Pipeline orchestration for briefwire.
//!
//! [`Sequencer`] drives the eight phases in order over a
//! [`CheckpointManager`](briefwire_storage::CheckpointManager), skipping any
//! phase whose checkpoint already exists for the run date. The phase bodies
//! live in [`phases`]; prompt text and final ordering live in [`prompts`] and
//! [`ranking`].

pub mod phases;
pub mod prompts;
pub mod ranking;
pub mod sequencer;

#[cfg(test)]
mod testing;

pub use phases::{Guards, Pacer, PhaseContext};
pub use ranking::rank_articles;
pub use sequencer::{ProgressReporter, RunReport, RunStatus, Sequencer, SilentProgress, run_status};
