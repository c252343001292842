//! Scheduler implementation: one timer loop per job, skip-on-busy
//! dispatch, panic isolation, and graceful join-on-stop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::job::Job;

/// Collects jobs before launch. Jobs can only be added here; starting
/// consumes the scheduler and returns a [`SchedulerHandle`], so no job
/// can be added to a live scheduler.
#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job. Each job fires once immediately on start, then on
    /// every interval.
    pub fn add(&mut self, job: Job) {
        debug!(job = %job.name, interval = ?job.interval, "scheduler: job registered");
        self.jobs.push(job);
    }

    /// Launches one timer loop per registered job.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, _) = watch::channel(false);

        let handles = self
            .jobs
            .into_iter()
            .map(|job| {
                let shutdown = shutdown_tx.subscribe();
                tokio::spawn(run_loop(job, shutdown))
            })
            .collect();

        SchedulerHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

/// Handle to a live scheduler. Dropping it without calling [`stop`]
/// signals the loops to exit but does not wait for them.
///
/// [`stop`]: SchedulerHandle::stop
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals every timer loop to exit and waits until all in-flight job
    /// invocations have returned.
    ///
    /// The wait is unbounded; a job body must never call `stop` on its own
    /// scheduler.
    pub async fn stop(self) {
        info!("scheduler: stopping");
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("scheduler: stopped");
    }
}

/// One job's timer loop: fire immediately, then every interval, until the
/// shutdown signal arrives. Joins its in-flight invocation before exiting.
async fn run_loop(job: Job, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(job.interval);
    // Ticks missed while an invocation runs long are dropped, not replayed.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The single possible in-flight invocation; non-overlap means a new
    // handle is only stored after the previous task has finished.
    let mut inflight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(handle) = dispatch(&job) {
                    inflight = Some(handle);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    if let Some(handle) = inflight {
        let _ = handle.await;
    }
}

/// Fires the job in its own task, but only if the previous invocation has
/// finished. Busy ticks are logged and dropped, never queued.
fn dispatch(job: &Job) -> Option<JoinHandle<()>> {
    if job
        .busy
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        info!(job = %job.name, "scheduler: skipping tick, previous run still in progress");
        return None;
    }

    let name = job.name.clone();
    let busy = Arc::clone(&job.busy);
    let fut = (job.body)();

    Some(tokio::spawn(async move {
        debug!(job = %name, "scheduler: running job");
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(()) => debug!(job = %name, "scheduler: job finished"),
            Err(payload) => {
                error!(job = %name, panic = panic_message(payload.as_ref()), "scheduler: job panicked");
            }
        }
        busy.store(false, Ordering::Release);
    }))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
