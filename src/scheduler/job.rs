//! Job type: a named body run on a fixed interval.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future produced by a job body.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub(crate) type JobBody = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// A named unit of periodic work.
///
/// The body is any zero-argument async callable. It must implement its own
/// application-level retry and bound its own I/O; the scheduler gives
/// neither. At most one invocation of a job runs at a time.
pub struct Job {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) body: JobBody,
    /// Set while an invocation is running; ticks that find it set are dropped.
    pub(crate) busy: Arc<AtomicBool>,
}

impl Job {
    /// Creates a job that runs `body` every `interval`.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            body: Arc::new(move || Box::pin(body())),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
