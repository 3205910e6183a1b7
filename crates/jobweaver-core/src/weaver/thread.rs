//! Worker threads: request work, execute it, report back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::job::{JobPointer};
use crate::weaver::WeaverCore;

/// One worker owned by a weaver.
///
/// The thread itself carries almost no logic; it loops between applying for
/// work and executing whatever it is handed. Jobs see their worker through
/// this type.
pub struct WorkerThread {
    id: usize,
    weaver: Weak<WeaverCore>,
    current_job: Mutex<Option<JobPointer>>,
    finished: AtomicBool,
}

impl WorkerThread {
    pub(crate) fn new(id: usize, weaver: Weak<WeaverCore>) -> Self {
        WorkerThread {
            id,
            weaver,
            current_job: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_current_job(&self, job: Option<JobPointer>) {
        *self.current_job.lock() = job;
    }

    /// Forwards an abort request to whatever job currently runs here.
    pub(crate) fn request_abort(&self) {
        let job = self.current_job.lock().clone();
        if let Some(job) = job {
            job.request_abort();
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Reports a finished job to the weaver's observers. Invoked by the
    /// default end behavior of the execution chain.
    pub(crate) fn report_job_done(&self, job: &JobPointer) {
        if let Some(core) = self.weaver.upgrade() {
            core.notify_job_done(job);
        }
    }
}

/// Entry point of a worker thread.
pub(crate) fn worker_main(core: Arc<WeaverCore>, thread: Arc<WorkerThread>) {
    core.thread_entered_run(&thread);
    debug!(thread = thread.id(), "worker thread started");
    let mut was_busy = false;
    loop {
        let Some(job) = core.apply_for_work(&thread, was_busy) else {
            break;
        };
        core.notify_thread_busy(&thread, &job);
        thread.set_current_job(Some(job.clone()));
        job.execute(&job, &thread);
        thread.set_current_job(None);
        was_busy = true;
    }
    thread.finished.store(true, Ordering::Release);
    core.thread_leaving_run();
    debug!(thread = thread.id(), "worker thread exiting");
}
