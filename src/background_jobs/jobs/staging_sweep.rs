//! Staging expiry background job.
//!
//! Deletes converted files that were neither downloaded nor promoted
//! within the staging TTL.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::server::metrics;
use std::time::Duration;
use tracing::{debug, info};

pub struct StagingSweepJob {
    interval: Duration,
}

impl StagingSweepJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for StagingSweepJob {
    fn id(&self) -> &'static str {
        "staging_sweep"
    }

    fn name(&self) -> &'static str {
        "Staging Sweep"
    }

    fn description(&self) -> &'static str {
        "Delete staged conversions older than the staging TTL"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // A skipped sweep is picked up by the next run
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let deleted = ctx.staging.sweep();
        metrics::record_swept_files(deleted);

        if deleted > 0 {
            info!(
                "Removed {} expired staged files (ttl {:?})",
                deleted,
                ctx.staging.ttl()
            );
        } else {
            debug!("No expired staged files");
        }

        Ok(())
    }
}
