//! Periodic driver for the daemon's recurring jobs.
//!
//! The job table is static and config-derived, so nothing is persisted: the
//! engine recomputes every next-run instant at startup and after each firing,
//! and forwards fired jobs over mpsc to the daemon's router.

pub mod engine;
pub mod jobs;
pub mod schedule;
pub mod types;

pub use engine::SchedulerEngine;
pub use jobs::system_jobs;
pub use types::{FiredJob, JobName, JobSpec, Schedule};
