//! Scheduled job bodies.
//!
//! Jobs are thin glue: they call the tenant transport client (and, for
//! the upstream sync, the dual-mode upstream client), log outcomes, and
//! skip the tick on failure. Retry is simply the next scheduled run.

pub mod commands;
pub mod heartbeat;
pub mod upstream_sync;

use std::sync::Arc;

use crate::config::Config;
use crate::scheduler::{Job, Scheduler};
use crate::tenant::TenantClient;

/// Registers the standard job set with intervals from config. All jobs
/// share one rate-limited tenant client.
pub fn register(scheduler: &mut Scheduler, tenant: Arc<TenantClient>, cfg: Arc<Config>) {
    let client = Arc::clone(&tenant);
    scheduler.add(Job::new(
        "heartbeat",
        cfg.jobs.heartbeat_interval(),
        move || heartbeat::run(Arc::clone(&client)),
    ));

    let client = Arc::clone(&tenant);
    let config = Arc::clone(&cfg);
    scheduler.add(Job::new(
        "commandqueue",
        cfg.jobs.command_poll_interval(),
        move || commands::run(Arc::clone(&client), Arc::clone(&config)),
    ));

    if cfg.upstream.enabled {
        let client = Arc::clone(&tenant);
        let config = Arc::clone(&cfg);
        scheduler.add(Job::new(
            "upstream-sync",
            cfg.jobs.upstream_sync_interval(),
            move || upstream_sync::run(Arc::clone(&client), Arc::clone(&config)),
        ));
    }
}
