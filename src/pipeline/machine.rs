//! Step machine
//!
//! Decides, before the first stage and after every stage, whether the run continues
//! and with which stage. The machine only reads the run state; it never calls a
//! collaborator and never mutates anything.
//!
//! Guard order after a stage:
//! 1. `report` always completes the run
//! 2. `step_count >= max_steps` halts before another stage can run
//! 3. The stage's own continuation predicate
//!
//! `search`, `filter` and `crawl` halt on empty output. `extract` and `compare` let the
//! run continue with empty results so a (thin) report is still produced.

use crate::pipeline::{RunState, Stage};
use std::fmt;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The report stage ran
    Completed,
    /// The step ceiling was reached before `next` could run
    StepLimit { next: Stage },
    NoPlan,
    NoUrls,
    NoFilteredUrls,
    NoSuccessfulPages,
}

impl HaltReason {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::StepLimit { next } => write!(f, "step limit reached before {}", next),
            Self::NoPlan => write!(f, "no research plan"),
            Self::NoUrls => write!(f, "search found no URLs"),
            Self::NoFilteredUrls => write!(f, "no URLs left after filtering"),
            Self::NoSuccessfulPages => write!(f, "no page was fetched successfully"),
        }
    }
}

/// Decision of the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Run(Stage),
    Halt(HaltReason),
}

/// Stateless stage sequencer
#[derive(Debug, Clone, Copy, Default)]
pub struct StepMachine;

impl StepMachine {
    pub fn new() -> Self {
        Self
    }

    /// First transition of a fresh run
    pub fn start(&self, state: &RunState) -> Transition {
        if state.step_count >= state.max_steps {
            return Transition::Halt(HaltReason::StepLimit { next: Stage::Plan });
        }
        Transition::Run(Stage::Plan)
    }

    /// Transition after `completed` has run and its delta has been applied
    pub fn after(&self, completed: Stage, state: &RunState) -> Transition {
        let Some(next) = completed.next() else {
            return Transition::Halt(HaltReason::Completed);
        };

        if state.step_count >= state.max_steps {
            return Transition::Halt(HaltReason::StepLimit { next });
        }

        match Self::continuation(completed, state) {
            Some(reason) => Transition::Halt(reason),
            None => Transition::Run(next),
        }
    }

    /// Stage-specific halt predicate; `None` means continue
    fn continuation(completed: Stage, state: &RunState) -> Option<HaltReason> {
        match completed {
            Stage::Plan if state.plan.is_none() => Some(HaltReason::NoPlan),
            Stage::Search if state.urls.is_empty() => Some(HaltReason::NoUrls),
            Stage::Filter if state.filtered_urls.is_empty() => Some(HaltReason::NoFilteredUrls),
            Stage::Crawl if state.successful_pages().next().is_none() => {
                Some(HaltReason::NoSuccessfulPages)
            }
            _ => None,
        }
    }
}
