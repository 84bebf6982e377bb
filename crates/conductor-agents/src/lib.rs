//! Agents that collaborate with the research conductor.

mod reviewer;

pub use reviewer::{DraftState, ReviewOutcome, ReviewTask, ReviewerAgent};
