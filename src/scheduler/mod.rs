//! Periodic job scheduler.
//!
//! Holds named jobs and runs each on its own timer: every job fires once
//! immediately on start, then every interval. Invocations of the same job
//! never overlap; a tick that arrives while the previous run is still
//! active is logged and dropped. Job panics are caught at the dispatch
//! boundary so one job's failure never affects the others.

mod core;
mod job;

pub use self::core::{Scheduler, SchedulerHandle};
pub use job::{Job, JobFuture};
