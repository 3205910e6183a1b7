//! Composite jobs: a collection completes only when all of its elements
//! have.
//!
//! The collection itself is an (empty-bodied) job. When a worker picks it
//! up, its own execution finishes first, then the elements are published to
//! the weaver in one batch. A counter initialized to elements + 1 is
//! decremented once per finish event; the decrement that reaches zero runs
//! the final cleanup and reports the collection as done, exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::JobError;
use crate::job::executor::{execute_with_chain, ExecuteWrapper, ExecutorChain};
use crate::job::{Job, JobCommon, JobKey, JobPointer, JobStatus};
use crate::weaver::{LockedQueue, QueueHandle, WorkerThread};

/// Reports element starts and finishes back to the owning collection.
///
/// One of these is installed on every element (and on the collection
/// itself); it removes itself from the chain after the run.
struct CollectionWrapper {
    collection: Weak<JobCollection>,
}

impl ExecuteWrapper for CollectionWrapper {
    fn begin(&self, inner: &ExecutorChain, job: &JobPointer, thread: &WorkerThread) {
        inner.begin(job, thread);
        if let Some(collection) = self.collection.upgrade() {
            collection.element_started(job, thread);
        }
    }

    fn end(&self, inner: &ExecutorChain, job: &JobPointer, thread: &WorkerThread) {
        if let Some(collection) = self.collection.upgrade() {
            collection.element_finished(job, thread);
        }
        inner.end(job, thread);
    }

    fn discard_after_run(&self) -> bool {
        true
    }
}

/// Suppresses the default begin/end of the collection itself.
///
/// The collection announces itself through the element counters instead:
/// started when the first element starts, done when the counter drains.
struct SelfWrapper;

impl ExecuteWrapper for SelfWrapper {
    fn begin(&self, _inner: &ExecutorChain, _job: &JobPointer, _thread: &WorkerThread) {}

    fn end(&self, _inner: &ExecutorChain, _job: &JobPointer, _thread: &WorkerThread) {}
}

struct CollectionInner {
    elements: Vec<JobPointer>,
    /// The weaver this collection is queued in, if any.
    queue: Option<QueueHandle>,
    /// Keeps the collection alive from pickup until final completion.
    self_ref: Option<JobPointer>,
    /// True from pickup until the elements have been published.
    self_is_executing: bool,
}

/// A job that composes other jobs and completes only after all of them.
pub struct JobCollection {
    common: JobCommon,
    weak_self: Weak<JobCollection>,
    /// Finish events still outstanding: elements + the collection itself.
    job_counter: AtomicUsize,
    jobs_started: AtomicUsize,
    inner: Mutex<CollectionInner>,
}

impl JobCollection {
    pub fn new() -> Arc<Self> {
        Self::with_priority(0)
    }

    pub fn with_priority(priority: i32) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<JobCollection>| {
            let collection = JobCollection {
                common: JobCommon::with_priority(priority),
                weak_self: weak.clone(),
                job_counter: AtomicUsize::new(0),
                jobs_started: AtomicUsize::new(0),
                inner: Mutex::new(CollectionInner {
                    elements: Vec::new(),
                    queue: None,
                    self_ref: None,
                    self_is_executing: false,
                }),
            };
            collection.common.wrap_executor(Box::new(SelfWrapper));
            collection.common.wrap_executor(Box::new(CollectionWrapper {
                collection: weak.clone(),
            }));
            collection
        })
    }

    /// Appends `job` to the collection.
    ///
    /// Allowed until the collection is queued, and again while the
    /// collection itself is executing (elements may spawn grandchildren).
    pub fn add_job(&self, job: JobPointer) {
        let mut inner = self.inner.lock();
        assert!(
            inner.queue.is_none() || inner.self_is_executing,
            "elements can only be added before queueing or while the collection executes"
        );
        job.common().wrap_executor(Box::new(CollectionWrapper {
            collection: self.weak_self.clone(),
        }));
        inner.elements.push(job);
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().elements.len()
    }

    /// Snapshot of the current elements.
    pub fn elements(&self) -> Vec<JobPointer> {
        self.inner.lock().elements.clone()
    }

    /// Stops the collection: dequeues it if it is still waiting, otherwise
    /// dequeues every element individually.
    pub fn stop(&self) {
        let queue = self.inner.lock().queue.clone();
        let Some(queue) = queue else { return };
        let Some(me) = self.weak_self.upgrade() else {
            return;
        };
        let me: JobPointer = me;
        debug!(collection = %JobKey::of(&me), "stopping collection");
        if !queue.dequeue(&me) {
            self.dequeue_elements(|element| queue.dequeue(element));
        }
    }

    fn element_started(&self, job: &JobPointer, thread: &WorkerThread) {
        let _ = job;
        if self.jobs_started.fetch_add(1, Ordering::AcqRel) == 0 {
            // the first element to run announces the collection itself
            let self_job = self.inner.lock().self_ref.clone();
            if let Some(self_job) = self_job {
                self_job.default_begin(&self_job, thread);
            }
        }
    }

    fn element_finished(&self, job: &JobPointer, thread: &WorkerThread) {
        let _ = job;
        let batch = {
            let mut inner = self.inner.lock();
            if inner.self_is_executing {
                // the collection itself always finishes first; only then are
                // the elements published, so the counter sees exactly
                // elements + 1 decrements
                inner.self_is_executing = false;
                self.job_counter
                    .store(inner.elements.len() + 1, Ordering::Release);
                Some((inner.queue.clone(), inner.elements.clone()))
            } else {
                None
            }
        };
        if let Some((queue, elements)) = batch {
            trace!(count = elements.len(), "publishing collection elements");
            if let (Some(queue), false) = (queue, elements.is_empty()) {
                queue.enqueue(elements);
            }
        }

        // the counter never goes below zero: a stopped collection has
        // already zeroed it and cleaned up
        let mut current = self.job_counter.load(Ordering::Acquire);
        let mut reached_zero = false;
        while current > 0 {
            match self.job_counter.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    reached_zero = current == 1;
                    break;
                }
                Err(observed) => current = observed,
            }
        }
        if reached_zero {
            self.final_cleanup();
            let self_job = self.inner.lock().self_ref.take();
            if let Some(self_job) = self_job {
                self_job.default_end(&self_job, thread);
            }
        }
    }

    /// Dequeues every element through `dequeue_element` and, if completion
    /// was still pending, runs the final cleanup (the elements will never
    /// report in).
    fn dequeue_elements(&self, mut dequeue_element: impl FnMut(&JobPointer) -> bool) {
        let elements = {
            let inner = self.inner.lock();
            if inner.queue.is_none() {
                return;
            }
            inner.elements.clone()
        };
        for element in &elements {
            dequeue_element(element);
        }
        if self.job_counter.swap(0, Ordering::AcqRel) != 0 {
            self.final_cleanup();
            self.inner.lock().self_ref = None;
        }
    }

    /// Releases whatever the collection still holds and marks it done.
    fn final_cleanup(&self) {
        let self_job = self.inner.lock().self_ref.clone();
        if let Some(self_job) = &self_job {
            self.common.return_policy_resources(self_job);
        }
        self.common.set_status(JobStatus::Success);
        self.inner.lock().queue = None;
    }
}

impl Job for JobCollection {
    fn common(&self) -> &JobCommon {
        &self.common
    }

    /// The collection's own body is empty; the elements do the work.
    fn run(&self, _job: &JobPointer, _thread: &WorkerThread) -> Result<(), JobError> {
        Ok(())
    }

    fn execute(&self, job: &JobPointer, thread: &WorkerThread) {
        {
            let mut inner = self.inner.lock();
            debug_assert!(inner.self_ref.is_none());
            inner.self_ref = Some(job.clone());
            inner.self_is_executing = true; // reset in element_finished
        }
        execute_with_chain(job, thread);
    }

    fn about_to_be_queued(&self, job: &JobPointer, queue: &mut LockedQueue<'_>) {
        let _ = job;
        let mut inner = self.inner.lock();
        assert!(
            inner.queue.is_none(),
            "a collection can only be queued once"
        );
        inner.queue = Some(queue.handle());
    }

    fn about_to_be_dequeued(&self, job: &JobPointer, queue: &mut LockedQueue<'_>) {
        self.dequeue_elements(|element| queue.dequeue(element));
        self.inner.lock().queue = None;
        self.common.free_policy_resources(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak as SyncWeak;

    struct NopJob {
        common: JobCommon,
    }

    impl NopJob {
        fn new() -> JobPointer {
            Arc::new(NopJob {
                common: JobCommon::new(),
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
    fn elements_accumulate_in_order() {
        let collection = JobCollection::new();
        let first = NopJob::new();
        let second = NopJob::new();
        collection.add_job(first.clone());
        collection.add_job(second.clone());

        assert_eq!(collection.job_count(), 2);
        let elements = collection.elements();
        assert!(crate::job::same_job(&elements[0], &first));
        assert!(crate::job::same_job(&elements[1], &second));
    }

    #[test]
    fn empty_collection_completes_on_its_own_execution() {
        let collection = JobCollection::new();
        let me: JobPointer = collection.clone();
        // simulate being queued: the collection believes it is bound
        collection.inner.lock().queue = Some(QueueHandle::detached());

        let thread = WorkerThread::new(0, SyncWeak::new());
        me.execute(&me, &thread);

        assert_eq!(collection.status(), JobStatus::Success);
        assert!(collection.inner.lock().self_ref.is_none());
        assert_eq!(collection.job_counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_before_queueing_is_a_no_op() {
        let collection = JobCollection::new();
        collection.add_job(NopJob::new());
        collection.stop();
        assert_eq!(collection.status(), JobStatus::New);
    }

    #[test]
    #[should_panic(expected = "elements can only be added")]
    fn adding_after_queueing_panics() {
        let collection = JobCollection::new();
        collection.inner.lock().queue = Some(QueueHandle::detached());
        collection.add_job(NopJob::new());
    }
}
