//! Message processing.
//!
//! The [`AgentLoop`] pulls messages off the bus and answers them. Commands go
//! to the [`CommandRouter`](crate::commands::CommandRouter); conversation
//! goes through the [`TurnProcessor`], which talks to the model and keeps the
//! per-user memory compact.

mod compaction;
mod loop_runner;
mod processor;

pub use compaction::Compactor;
pub use loop_runner::AgentLoop;
pub use processor::{CompactionOutcome, TurnProcessor};
