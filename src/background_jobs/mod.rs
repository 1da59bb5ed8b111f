//! Background job scheduling and execution system.
//!
//! Periodic maintenance such as expiring stale staged conversions runs
//! here, off the request path.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::JobScheduler;
