//! Shared helpers for the integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jobweaver_core::{Job, JobCommon, JobError, JobPointer, WorkerThread};

/// Installs a test subscriber once per test binary; `RUST_LOG` controls the
/// verbosity.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type JobBody = dyn Fn(&JobPointer, &WorkerThread) -> Result<(), JobError> + Send + Sync;

/// A job around a closure.
pub struct FnJob {
    common: JobCommon,
    body: Box<JobBody>,
}

impl FnJob {
    pub fn new(
        body: impl Fn(&JobPointer, &WorkerThread) -> Result<(), JobError> + Send + Sync + 'static,
    ) -> JobPointer {
        Self::with_priority(0, body)
    }

    pub fn with_priority(
        priority: i32,
        body: impl Fn(&JobPointer, &WorkerThread) -> Result<(), JobError> + Send + Sync + 'static,
    ) -> JobPointer {
        Arc::new(FnJob {
            common: JobCommon::with_priority(priority),
            body: Box::new(body),
        })
    }
}

impl Job for FnJob {
    fn common(&self) -> &JobCommon {
        &self.common
    }

    fn run(&self, job: &JobPointer, thread: &WorkerThread) -> Result<(), JobError> {
        (self.body)(job, thread)
    }
}

/// Polls `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
