//! Task lifecycle: creation with dedup, completion with recurrence respawn,
//! reminders, outgoing-task completion monitoring, and the deadline review.

pub mod engine;
pub mod reminders;
pub mod review;
pub mod tracking;

pub use engine::{CreateOutcome, TaskEngine};
