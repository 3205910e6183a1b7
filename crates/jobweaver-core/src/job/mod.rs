//! The Job contract: status, priority, queue policies and execution chain.

pub mod collection;
pub mod executor;

pub use collection::JobCollection;
pub use executor::{execute_with_chain, ExecuteWrapper, ExecutorChain};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::JobError;
use crate::policy::QueuePolicy;
use crate::weaver::{LockedQueue, WorkerThread};

/// Shared pointer under which jobs circulate between queue and workers.
pub type JobPointer = Arc<dyn Job>;

/// Job status.
///
/// Transitions form a DAG:
/// - New -> Queued -> Running -> Success | Failed | Aborted
/// - Queued -> New on a successful dequeue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Not yet handed to a weaver.
    New,
    /// Sitting in a weaver's assignment list.
    Queued,
    /// Executing on a worker thread.
    Running,
    Success,
    Failed,
    Aborted,
}

impl JobStatus {
    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Aborted
        )
    }
}

/// Identity of a job pointer, used for queue bookkeeping and logs.
///
/// Two pointers to the same job allocation compare equal regardless of how
/// they were cloned or coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey(usize);

impl JobKey {
    pub fn of(job: &JobPointer) -> Self {
        JobKey(Arc::as_ptr(job) as *const () as usize)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Do `a` and `b` point at the same job?
pub fn same_job(a: &JobPointer, b: &JobPointer) -> bool {
    JobKey::of(a) == JobKey::of(b)
}

struct JobInner {
    status: JobStatus,
    policies: Vec<Arc<dyn QueuePolicy>>,
    /// True between a successful admission walk and the matching release.
    policies_acquired: bool,
    chain: ExecutorChain,
}

/// Bookkeeping shared by every job implementation.
///
/// Implementors embed one `JobCommon` and hand it out through
/// [`Job::common`]; the trait's default methods do the rest. The inner mutex
/// guards status transitions, the policy list and the execution chain. Lock
/// order: weaver mutex outer, job mutex inner, never the reverse.
pub struct JobCommon {
    priority: i32,
    aborted: AtomicBool,
    inner: Mutex<JobInner>,
}

impl JobCommon {
    pub fn new() -> Self {
        Self::with_priority(0)
    }

    pub fn with_priority(priority: i32) -> Self {
        JobCommon {
            priority,
            aborted: AtomicBool::new(false),
            inner: Mutex::new(JobInner {
                status: JobStatus::New,
                policies: Vec::new(),
                policies_acquired: false,
                chain: ExecutorChain::Default,
            }),
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn status(&self) -> JobStatus {
        self.inner.lock().status
    }

    pub fn set_status(&self, status: JobStatus) {
        self.inner.lock().status = status;
    }

    pub fn abort_requested(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn request_abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Attaches a policy. The policy must outlive every queue attempt of
    /// this job; policies cannot be changed per enqueue.
    pub fn assign_queue_policy(&self, policy: Arc<dyn QueuePolicy>) {
        self.inner.lock().policies.push(policy);
    }

    /// Detaches a policy previously assigned with [`assign_queue_policy`].
    ///
    /// [`assign_queue_policy`]: JobCommon::assign_queue_policy
    pub fn remove_queue_policy(&self, policy: &Arc<dyn QueuePolicy>) {
        let target = Arc::as_ptr(policy) as *const ();
        self.inner
            .lock()
            .policies
            .retain(|p| Arc::as_ptr(p) as *const () != target);
    }

    pub fn queue_policies(&self) -> Vec<Arc<dyn QueuePolicy>> {
        self.inner.lock().policies.clone()
    }

    /// Installs `wrapper` as the new outermost link of the execution chain;
    /// the previous head becomes its inner link.
    pub fn wrap_executor(&self, wrapper: Box<dyn ExecuteWrapper>) {
        let mut inner = self.inner.lock();
        let chain = std::mem::replace(&mut inner.chain, ExecutorChain::Default);
        inner.chain = chain.wrap(wrapper);
    }

    pub(crate) fn take_chain(&self) -> ExecutorChain {
        std::mem::replace(&mut self.inner.lock().chain, ExecutorChain::Default)
    }

    pub(crate) fn put_chain(&self, chain: ExecutorChain) {
        self.inner.lock().chain = chain;
    }

    /// Remembers that the admission walk acquired every policy of this job.
    pub(crate) fn note_policies_acquired(&self) {
        self.inner.lock().policies_acquired = true;
    }

    /// Gives the acquired policy resources back, exactly once per admission:
    /// `release` after a run, `free` after an abort.
    pub(crate) fn return_policy_resources(&self, job: &JobPointer) {
        let (policies, aborted) = {
            let mut inner = self.inner.lock();
            if !inner.policies_acquired {
                return;
            }
            inner.policies_acquired = false;
            (inner.policies.clone(), inner.status == JobStatus::Aborted)
        };
        for policy in &policies {
            if aborted {
                policy.free(job);
            } else {
                policy.release(job);
            }
        }
    }

    /// Unconditional `free` of every policy, used when the job leaves the
    /// queue without having run. Policies treat a free without a matching
    /// grant as a no-op.
    pub(crate) fn free_policy_resources(&self, job: &JobPointer) {
        let policies = {
            let mut inner = self.inner.lock();
            inner.policies_acquired = false;
            inner.policies.clone()
        };
        for policy in &policies {
            policy.free(job);
        }
    }
}

impl Default for JobCommon {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of schedulable work.
///
/// Implementors provide [`run`](Job::run) and embed a [`JobCommon`]; every
/// other method has a default implementation over it. Jobs are shared as
/// [`JobPointer`]s; the same pointer the weaver queued is handed back to the
/// trait methods so composite jobs can keep themselves alive.
pub trait Job: Send + Sync {
    /// Access to the shared job bookkeeping.
    fn common(&self) -> &JobCommon;

    /// The job body, executed on a worker thread. Long-running bodies should
    /// poll [`abort_requested`](Job::abort_requested) and bail out with
    /// [`JobError::Aborted`].
    fn run(&self, job: &JobPointer, thread: &WorkerThread) -> Result<(), JobError>;

    /// Entered by the worker thread the job was assigned to. The default
    /// invokes the execution chain around [`run`](Job::run).
    fn execute(&self, job: &JobPointer, thread: &WorkerThread) {
        execute_with_chain(job, thread);
    }

    fn priority(&self) -> i32 {
        self.common().priority()
    }

    fn status(&self) -> JobStatus {
        self.common().status()
    }

    fn set_status(&self, status: JobStatus) {
        self.common().set_status(status);
    }

    fn abort_requested(&self) -> bool {
        self.common().abort_requested()
    }

    fn request_abort(&self) {
        self.common().request_abort();
    }

    fn queue_policies(&self) -> Vec<Arc<dyn QueuePolicy>> {
        self.common().queue_policies()
    }

    /// See [`JobCommon::wrap_executor`].
    fn wrap_executor(&self, wrapper: Box<dyn ExecuteWrapper>) {
        self.common().wrap_executor(wrapper);
    }

    /// Called by the weaver, under its mutex, right before the job enters
    /// the assignment list.
    fn about_to_be_queued(&self, job: &JobPointer, queue: &mut LockedQueue<'_>) {
        let _ = (job, queue);
    }

    /// Called by the weaver, under its mutex, right before the job leaves
    /// the assignment list without having run.
    fn about_to_be_dequeued(&self, job: &JobPointer, queue: &mut LockedQueue<'_>) {
        let _ = queue;
        self.common().free_policy_resources(job);
    }

    /// Default begin behavior, invoked by the innermost chain link.
    fn default_begin(&self, job: &JobPointer, thread: &WorkerThread) {
        trace!(job = %JobKey::of(job), thread = thread.id(), "job starting");
    }

    /// Default end behavior, invoked by the innermost chain link: returns
    /// policy resources and reports the job as done.
    fn default_end(&self, job: &JobPointer, thread: &WorkerThread) {
        self.common().return_policy_resources(job);
        trace!(job = %JobKey::of(job), status = ?self.status(), "job finished");
        thread.report_job_done(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    struct NopJob {
        common: JobCommon,
    }

    impl NopJob {
        fn with_priority(priority: i32) -> JobPointer {
            Arc::new(NopJob {
                common: JobCommon::with_priority(priority),
            })
        }
    }

    impl Job for NopJob {
        fn common(&self) -> &JobCommon {
            &self.common
        }

        fn run(&self, _job: &JobPointer, _thread: &WorkerThread) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[test]
    fn new_job_starts_as_new() {
        let job = NopJob::with_priority(0);
        assert_eq!(job.status(), JobStatus::New);
        assert!(!job.abort_requested());
    }

    #[test]
    fn priority_is_fixed_at_construction() {
        let job = NopJob::with_priority(7);
        assert_eq!(job.priority(), 7);
    }

    #[test]
    fn abort_flag_is_sticky() {
        let job = NopJob::with_priority(0);
        job.request_abort();
        assert!(job.abort_requested());
    }

    #[test]
    fn execution_reaches_a_terminal_status() {
        let job = NopJob::with_priority(0);
        let thread = WorkerThread::new(0, Weak::new());
        job.execute(&job, &thread);
        assert_eq!(job.status(), JobStatus::Success);
        assert!(job.status().is_terminal());
    }

    #[test]
    fn job_keys_track_the_allocation() {
        let a = NopJob::with_priority(0);
        let b = NopJob::with_priority(0);
        assert!(same_job(&a, &a.clone()));
        assert!(!same_job(&a, &b));
    }
}
