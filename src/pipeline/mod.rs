//! Research pipeline
//!
//! This module contains the orchestration core:
//! - [`RunState`] and [`StageDelta`], the typed state threaded through a job
//! - The seven stage nodes (plan, search, filter, crawl, extract, compare, report)
//! - The [`StepMachine`] guard deciding whether and where a run continues
//! - The [`JobRunner`], which drives one job and persists it after every stage
//!
//! Collaborators reach the stages through the injected [`Services`] bundle.

mod machine;
pub mod nodes;
mod runner;
mod stage;
pub mod state;

pub use machine::{HaltReason, StepMachine, Transition};
pub use runner::{JobRunner, Services};
pub use stage::Stage;
pub use state::{ErrorRecord, RunState, StageDelta};

#[cfg(test)]
pub(crate) mod test_support;
