//! The weaver core: assignment queue, worker inventory and lifecycle.
//!
//! A single mutex guards the scheduling state (assignments, inventory,
//! active count); two condition variables share it: `job_available` (workers
//! wait here for work) and `job_finished` (drain waits here for idle). The
//! lifecycle state is stored atomically so observation is lock-free, while
//! transitions always happen under the mutex.

mod state;
mod thread;

pub use state::WeaverState;
pub use thread::WorkerThread;

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::BuildError;
use crate::job::{JobKey, JobPointer, JobStatus};
use crate::observability::{WeaverCounts, WeaverObserver};

/// How long the drain loop waits before re-waking the workers.
const DRAIN_WAIT: Duration = Duration::from_millis(50);

/// How long shutdown waits for a worker before poking it again.
const REAP_WAIT: Duration = Duration::from_millis(100);

fn default_thread_cap() -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (2 * parallelism).max(4)
}

/// Builds a [`Weaver`], validating the configuration up front.
pub struct WeaverBuilder {
    thread_cap: Option<usize>,
}

impl WeaverBuilder {
    pub fn new() -> Self {
        WeaverBuilder { thread_cap: None }
    }

    /// Caps the worker inventory. Defaults to
    /// `max(4, 2 * available_parallelism)`.
    pub fn thread_cap(mut self, cap: usize) -> Self {
        self.thread_cap = Some(cap);
        self
    }

    pub fn build(self) -> Result<Weaver, BuildError> {
        let cap = match self.thread_cap {
            Some(0) => return Err(BuildError::ZeroThreadCap),
            Some(cap) => cap,
            None => default_thread_cap(),
        };
        Ok(Weaver::with_cap(cap))
    }
}

impl Default for WeaverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct WorkerHandle {
    thread: Arc<WorkerThread>,
    join: std::thread::JoinHandle<()>,
}

/// Scheduling state, guarded by the weaver mutex.
pub(crate) struct Scheduling {
    /// Queued jobs, sorted by priority descending, stable within a priority.
    assignments: Vec<JobPointer>,
    inventory: Vec<WorkerHandle>,
    /// Workers currently executing a job.
    active: usize,
    inventory_max: usize,
}

impl Scheduling {
    fn is_idle(&self) -> bool {
        self.assignments.is_empty() && self.active == 0
    }

    fn position_of(&self, job: &JobPointer) -> Option<usize> {
        let key = JobKey::of(job);
        self.assignments.iter().position(|j| JobKey::of(j) == key)
    }
}

/// The owning handle to a weaver.
///
/// Dropping the handle shuts the weaver down if [`shut_down`](Weaver::shut_down)
/// has not been called yet: worker threads never outlive the handle.
pub struct Weaver {
    core: Arc<WeaverCore>,
}

impl Weaver {
    /// A weaver with the default thread cap, ready for work.
    pub fn new() -> Self {
        Self::with_cap(default_thread_cap())
    }

    fn with_cap(cap: usize) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<WeaverCore>| WeaverCore {
            weak: weak.clone(),
            sched: Mutex::new(Scheduling {
                assignments: Vec::new(),
                inventory: Vec::new(),
                active: 0,
                inventory_max: cap,
            }),
            job_available: Condvar::new(),
            job_finished: Condvar::new(),
            thread_exited: Condvar::new(),
            state: AtomicU8::new(WeaverState::InConstruction as u8),
            created_threads: AtomicUsize::new(0),
            started_threads: Mutex::new(0),
            started_threads_cv: Condvar::new(),
            next_thread_id: AtomicUsize::new(1),
            observers: Mutex::new(Vec::new()),
        });
        {
            let mut sched = core.sched.lock();
            core.set_state_locked(&mut sched, WeaverState::WorkingHard);
        }
        Weaver { core }
    }

    /// Hands `jobs` to the weaver in one batch. Ignored in terminal states.
    pub fn enqueue(&self, jobs: Vec<JobPointer>) {
        self.core.enqueue(jobs);
    }

    pub fn enqueue_job(&self, job: JobPointer) {
        self.core.enqueue(vec![job]);
    }

    /// Removes `job` from the queue if it is still waiting. Returns false
    /// if the job was not queued here; that is not an error.
    pub fn dequeue(&self, job: &JobPointer) -> bool {
        self.core.dequeue(job)
    }

    /// Removes every waiting job.
    pub fn dequeue_all(&self) {
        self.core.dequeue_all();
    }

    /// Blocks until the weaver is idle.
    pub fn finish(&self) {
        self.core.finish();
    }

    /// Stops handing out assignments and drains the active workers; the
    /// weaver announces `Suspended` once the last one has reported back.
    pub fn suspend(&self) {
        self.core.suspend();
    }

    pub fn resume(&self) {
        self.core.resume();
    }

    /// Drains the queue, retires every worker thread and leaves the weaver
    /// in its terminal state. Further calls are no-ops.
    pub fn shut_down(&self) {
        self.core.shut_down();
    }

    /// Asks every currently running job to abort. Cooperative: jobs have to
    /// poll their abort flag.
    pub fn request_abort(&self) {
        self.core.request_abort();
    }

    /// Adjusts the inventory cap. The inventory never shrinks before
    /// shutdown; a lower cap only limits further growth.
    ///
    /// # Panics
    ///
    /// A cap of zero is a contract violation and panics.
    pub fn set_maximum_thread_count(&self, cap: usize) {
        assert!(cap > 0, "thread cap must be larger than zero");
        self.core.sched.lock().inventory_max = cap;
    }

    pub fn maximum_thread_count(&self) -> usize {
        self.core.sched.lock().inventory_max
    }

    pub fn current_thread_count(&self) -> usize {
        self.core.sched.lock().inventory.len()
    }

    pub fn queue_length(&self) -> usize {
        self.core.sched.lock().assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.sched.lock().assignments.is_empty()
    }

    /// True when the queue is empty and no worker is busy.
    pub fn is_idle(&self) -> bool {
        self.core.sched.lock().is_idle()
    }

    /// Lock-free read of the lifecycle state.
    pub fn state(&self) -> WeaverState {
        self.core.state()
    }

    pub fn register_observer(&self, observer: Arc<dyn WeaverObserver>) {
        self.core.observers.lock().push(observer);
    }

    pub fn counts(&self) -> WeaverCounts {
        let sched = self.core.sched.lock();
        WeaverCounts {
            queued: sched.assignments.len(),
            active: sched.active,
            inventory: sched.inventory.len(),
            inventory_max: sched.inventory_max,
            state: self.core.state(),
        }
    }

    /// Writes the current assignment list to the log, for debugging.
    pub fn log_queue_state(&self) {
        let sched = self.core.sched.lock();
        debug!(
            queued = sched.assignments.len(),
            active = sched.active,
            state = self.core.state().name(),
            "assignment queue"
        );
        for (position, job) in sched.assignments.iter().enumerate() {
            debug!(
                position,
                job = %JobKey::of(job),
                priority = job.priority(),
                status = ?job.status(),
                "queued job"
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn assignment_keys(&self) -> Vec<JobKey> {
        self.core
            .sched
            .lock()
            .assignments
            .iter()
            .map(JobKey::of)
            .collect()
    }
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Weaver {
    fn drop(&mut self) {
        self.core.shut_down();
    }
}

/// View of the weaver's queue for job hooks that already run under its
/// mutex. Composite jobs use it to dequeue their elements without
/// re-entering the public API.
pub struct LockedQueue<'a> {
    core: Arc<WeaverCore>,
    sched: &'a mut Scheduling,
}

impl LockedQueue<'_> {
    /// A detached handle to the same weaver, safe to keep after the hook
    /// returns.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            core: Arc::downgrade(&self.core),
        }
    }

    pub fn enqueue(&mut self, jobs: Vec<JobPointer>) {
        self.core.enqueue_locked(self.sched, jobs);
    }

    pub fn dequeue(&mut self, job: &JobPointer) -> bool {
        self.core.dequeue_locked(self.sched, job)
    }
}

/// Weak handle to a weaver's queue.
///
/// Jobs hold these instead of the weaver itself; once the weaver is gone
/// every operation turns into a no-op.
#[derive(Clone)]
pub struct QueueHandle {
    core: Weak<WeaverCore>,
}

impl QueueHandle {
    pub fn enqueue(&self, jobs: Vec<JobPointer>) {
        if let Some(core) = self.core.upgrade() {
            core.enqueue(jobs);
        }
    }

    pub fn dequeue(&self, job: &JobPointer) -> bool {
        match self.core.upgrade() {
            Some(core) => core.dequeue(job),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        QueueHandle { core: Weak::new() }
    }
}

pub(crate) struct WeaverCore {
    weak: Weak<WeaverCore>,
    sched: Mutex<Scheduling>,
    /// Workers wait here for an assignable job.
    job_available: Condvar,
    /// The drain loop waits here for completions (and dequeues).
    job_finished: Condvar,
    /// Shutdown waits here for workers leaving their run loop.
    thread_exited: Condvar,
    state: AtomicU8,
    created_threads: AtomicUsize,
    /// With its condvar, stands in for the "all workers started" semaphore:
    /// shutdown must not run while a spawned worker has not yet entered its
    /// run loop.
    started_threads: Mutex<usize>,
    started_threads_cv: Condvar,
    next_thread_id: AtomicUsize,
    observers: Mutex<Vec<Arc<dyn WeaverObserver>>>,
}

impl WeaverCore {
    pub(crate) fn state(&self) -> WeaverState {
        WeaverState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Transitions must hold the scheduling mutex; the guard parameter
    /// enforces that.
    fn set_state_locked(&self, _sched: &mut Scheduling, next: WeaverState) {
        let previous = WeaverState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            debug!(from = previous.name(), to = next.name(), "weaver state changed");
            if next == WeaverState::Suspended {
                self.for_each_observer(|o| o.suspended());
            }
            self.for_each_observer(|o| o.state_changed(next));
        }
    }

    fn enqueue(&self, jobs: Vec<JobPointer>) {
        let mut sched = self.sched.lock();
        self.enqueue_locked(&mut sched, jobs);
    }

    fn enqueue_locked(&self, sched: &mut Scheduling, jobs: Vec<JobPointer>) {
        let state = self.state();
        if !state.accepts_new_jobs() {
            debug!(state = state.name(), count = jobs.len(), "enqueue ignored");
            return;
        }
        let Some(core) = self.weak.upgrade() else {
            return;
        };
        for job in jobs {
            debug_assert_eq!(job.status(), JobStatus::New, "jobs can only be queued once");
            self.adjust_inventory_locked(sched, 1);
            trace!(job = %JobKey::of(&job), priority = job.priority(), "queueing job");
            job.about_to_be_queued(
                &job,
                &mut LockedQueue {
                    core: core.clone(),
                    sched: &mut *sched,
                },
            );
            let at = Self::insertion_point(sched, &job);
            sched.assignments.insert(at, job.clone());
            job.set_status(JobStatus::Queued);
            self.job_available.notify_all();
        }
    }

    /// Frontmost position whose predecessors all have priority >= the new
    /// job's, preserving insertion order among equals.
    fn insertion_point(sched: &Scheduling, job: &JobPointer) -> usize {
        let priority = job.priority();
        let mut at = sched.assignments.len();
        while at > 0 && sched.assignments[at - 1].priority() < priority {
            at -= 1;
        }
        at
    }

    /// Creates up to `new_jobs` worker threads, bounded by the inventory
    /// cap. The inventory only shrinks at shutdown.
    fn adjust_inventory_locked(&self, sched: &mut Scheduling, new_jobs: usize) {
        let reserve = sched.inventory_max.saturating_sub(sched.inventory.len());
        for _ in 0..reserve.min(new_jobs) {
            let Some(core) = self.weak.upgrade() else {
                return;
            };
            let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
            let worker = Arc::new(WorkerThread::new(id, self.weak.clone()));
            let spawned = std::thread::Builder::new()
                .name(format!("weaver-worker-{id}"))
                .spawn({
                    let worker = worker.clone();
                    move || thread::worker_main(core, worker)
                });
            match spawned {
                Ok(join) => {
                    self.created_threads.fetch_add(1, Ordering::AcqRel);
                    sched.inventory.push(WorkerHandle {
                        thread: worker,
                        join,
                    });
                    debug!(
                        thread = id,
                        inventory = sched.inventory.len(),
                        "worker thread created"
                    );
                }
                Err(err) => warn!(%err, "failed to spawn a worker thread"),
            }
        }
    }

    fn dequeue(&self, job: &JobPointer) -> bool {
        let mut sched = self.sched.lock();
        if !self.state().allows_dequeue() {
            return false;
        }
        self.dequeue_locked(&mut sched, job)
    }

    fn dequeue_locked(&self, sched: &mut Scheduling, job: &JobPointer) -> bool {
        if sched.position_of(job).is_none() {
            trace!(job = %JobKey::of(job), "job not found in queue");
            return false;
        }
        let Some(core) = self.weak.upgrade() else {
            return false;
        };
        job.about_to_be_dequeued(
            job,
            &mut LockedQueue {
                core,
                sched: &mut *sched,
            },
        );
        // the hook may have reshuffled the queue (collections dequeue their
        // elements), so look the job up again
        if let Some(at) = sched.position_of(job) {
            sched.assignments.remove(at);
        }
        job.set_status(JobStatus::New);
        debug!(
            job = %JobKey::of(job),
            remaining = sched.assignments.len(),
            "job dequeued"
        );
        // a dequeue looks exactly like a completion to anyone waiting for
        // idle
        self.job_finished.notify_all();
        true
    }

    fn dequeue_all(&self) {
        let mut sched = self.sched.lock();
        if !self.state().allows_dequeue() {
            return;
        }
        debug!(count = sched.assignments.len(), "dequeueing all jobs");
        while let Some(job) = sched.assignments.first().cloned() {
            self.dequeue_locked(&mut sched, &job);
        }
    }

    fn finish(&self) {
        let mut sched = self.sched.lock();
        while !sched.is_idle() && self.state() == WeaverState::WorkingHard {
            debug!(
                queued = sched.assignments.len(),
                active = sched.active,
                "waiting for the queue to drain"
            );
            if self
                .job_finished
                .wait_for(&mut sched, DRAIN_WAIT)
                .timed_out()
            {
                // a worker may have gone to sleep between its last check and
                // ours; poke the assignment side again
                self.job_available.notify_all();
            }
        }
    }

    fn suspend(&self) {
        let mut sched = self.sched.lock();
        if !self.state().can_suspend() {
            return;
        }
        self.set_state_locked(&mut sched, WeaverState::Suspending);
        if sched.active == 0 {
            self.set_state_locked(&mut sched, WeaverState::Suspended);
        }
        // wake parked workers so the last busy one is not the only candidate
        // to observe the drained state
        self.job_available.notify_all();
    }

    fn resume(&self) {
        let mut sched = self.sched.lock();
        if !self.state().can_resume() {
            return;
        }
        self.set_state_locked(&mut sched, WeaverState::WorkingHard);
        self.job_available.notify_all();
    }

    fn request_abort(&self) {
        let sched = self.sched.lock();
        for handle in &sched.inventory {
            handle.thread.request_abort();
        }
    }

    fn shut_down(&self) {
        match self.state() {
            WeaverState::InConstruction => {
                let mut sched = self.sched.lock();
                self.set_state_locked(&mut sched, WeaverState::Destructed);
                return;
            }
            WeaverState::ShuttingDown | WeaverState::Destructed => return,
            _ => {}
        }
        // no worker may still be on its way into the run loop
        self.wait_for_created_threads();
        self.finish();
        {
            let mut sched = self.sched.lock();
            self.set_state_locked(&mut sched, WeaverState::ShuttingDown);
            self.job_available.notify_all();
            self.job_finished.notify_all();
        }
        loop {
            let handle = self.sched.lock().inventory.pop();
            let Some(handle) = handle else { break };
            {
                let mut sched = self.sched.lock();
                while !handle.thread.is_finished() {
                    // the worker may have raced into a condvar wait after the
                    // shutdown wakeup; wake it again, bounded, until it leaves
                    self.job_available.notify_all();
                    if self
                        .thread_exited
                        .wait_for(&mut sched, REAP_WAIT)
                        .timed_out()
                    {
                        debug!(
                            thread = handle.thread.id(),
                            "worker has not exited yet, retrying"
                        );
                    }
                }
            }
            if handle.join.join().is_err() {
                warn!(thread = handle.thread.id(), "worker thread panicked");
            }
            self.for_each_observer(|o| o.thread_exited(&handle.thread));
        }
        let mut sched = self.sched.lock();
        debug_assert!(sched.inventory.is_empty());
        self.set_state_locked(&mut sched, WeaverState::Destructed);
    }

    fn wait_for_created_threads(&self) {
        let created = self.created_threads.load(Ordering::Acquire);
        let mut started = self.started_threads.lock();
        while *started < created {
            self.started_threads_cv.wait(&mut started);
        }
    }

    /// A worker asks for its next job. Blocks while there is nothing to do;
    /// returns None when the worker should exit.
    pub(crate) fn apply_for_work(
        &self,
        thread: &WorkerThread,
        was_busy: bool,
    ) -> Option<JobPointer> {
        let mut was_busy = was_busy;
        loop {
            match self.state() {
                WeaverState::WorkingHard | WeaverState::Suspending => {
                    if let Some(job) = self.take_first_available_job(thread, was_busy) {
                        return Some(job);
                    }
                }
                WeaverState::InConstruction | WeaverState::Suspended => {
                    if was_busy {
                        let mut sched = self.sched.lock();
                        self.dec_active_locked(&mut sched);
                    }
                    self.wait_for_available_job(thread);
                }
                WeaverState::ShuttingDown | WeaverState::Destructed => {
                    if was_busy {
                        let mut sched = self.sched.lock();
                        self.dec_active_locked(&mut sched);
                    }
                    return None;
                }
            }
            was_busy = false;
        }
    }

    /// Walks the assignment list in order and hands out the first job whose
    /// policies all admit it. Blocks on `job_available` when nothing is
    /// assignable.
    fn take_first_available_job(
        &self,
        thread: &WorkerThread,
        was_busy: bool,
    ) -> Option<JobPointer> {
        let mut sched = self.sched.lock();
        if was_busy {
            self.dec_active_locked(&mut sched);
        }
        if sched.active == 0 && self.state() == WeaverState::Suspending {
            self.set_state_locked(&mut sched, WeaverState::Suspended);
            return None;
        }
        if !self.state().assigns_jobs() {
            self.block_until_jobs_available(&mut sched, thread);
            return None;
        }
        let selected = sched
            .assignments
            .iter()
            .position(|candidate| self.can_be_executed(candidate));
        match selected {
            Some(at) => {
                let job = sched.assignments.remove(at);
                sched.active += 1;
                trace!(
                    job = %JobKey::of(&job),
                    thread = thread.id(),
                    active = sched.active,
                    "job assigned"
                );
                Some(job)
            }
            None => {
                self.block_until_jobs_available(&mut sched, thread);
                None
            }
        }
    }

    /// Consults the job's policies in order. Either every policy admits, or
    /// whatever was acquired is rolled back and the job stays queued.
    fn can_be_executed(&self, job: &JobPointer) -> bool {
        let policies = job.queue_policies();
        if policies.is_empty() {
            return true;
        }
        let mut acquired = Vec::with_capacity(policies.len());
        let mut admitted = true;
        for policy in &policies {
            if policy.can_run(job) {
                acquired.push(policy);
            } else {
                admitted = false;
                break;
            }
        }
        if admitted {
            job.common().note_policies_acquired();
        } else {
            trace!(job = %JobKey::of(job), "queue policy refused the job");
            for policy in acquired {
                policy.release(job);
            }
        }
        admitted
    }

    fn dec_active_locked(&self, sched: &mut Scheduling) {
        debug_assert!(sched.active > 0);
        sched.active -= 1;
        // the finished job may have released policy resources another job
        // was waiting for, and the drain loop wants to know either way
        self.job_finished.notify_all();
        if sched.is_idle() {
            self.for_each_observer(|o| o.finished());
        }
    }

    fn block_until_jobs_available(
        &self,
        sched: &mut MutexGuard<'_, Scheduling>,
        thread: &WorkerThread,
    ) {
        trace!(
            thread = thread.id(),
            state = self.state().name(),
            "worker waiting for jobs"
        );
        self.for_each_observer(|o| o.thread_suspended(thread));
        self.job_available.wait(sched);
    }

    fn wait_for_available_job(&self, thread: &WorkerThread) {
        let mut sched = self.sched.lock();
        // re-check under the lock: the state may have moved on since the
        // dispatch read, and the wakeup for that transition is not repeated
        if !self.state().parks_workers() {
            return;
        }
        self.for_each_observer(|o| o.thread_suspended(thread));
        self.job_available.wait(&mut sched);
    }

    pub(crate) fn thread_entered_run(&self, thread: &Arc<WorkerThread>) {
        {
            let mut started = self.started_threads.lock();
            *started += 1;
            self.started_threads_cv.notify_all();
        }
        self.for_each_observer(|o| o.thread_started(thread));
    }

    pub(crate) fn thread_leaving_run(&self) {
        // pair the notification with the mutex so the reaper cannot miss it
        let _sched = self.sched.lock();
        self.thread_exited.notify_all();
    }

    pub(crate) fn notify_thread_busy(&self, thread: &WorkerThread, job: &JobPointer) {
        self.for_each_observer(|o| o.thread_busy(thread, job));
    }

    pub(crate) fn notify_job_done(&self, job: &JobPointer) {
        self.for_each_observer(|o| o.job_done(job));
    }

    fn for_each_observer(&self, f: impl Fn(&dyn WeaverObserver)) {
        let observers: Vec<_> = self.observers.lock().clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::job::{Job, JobCommon, JobStatus};

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
    fn builder_rejects_a_zero_cap() {
        assert!(matches!(
            WeaverBuilder::new().thread_cap(0).build(),
            Err(BuildError::ZeroThreadCap)
        ));
    }

    #[test]
    fn builder_default_cap_is_at_least_four() {
        let weaver = WeaverBuilder::new().build().expect("valid configuration");
        assert!(weaver.maximum_thread_count() >= 4);
        weaver.shut_down();
    }

    #[test]
    #[should_panic(expected = "larger than zero")]
    fn runtime_zero_cap_panics() {
        let weaver = Weaver::new();
        weaver.set_maximum_thread_count(0);
    }

    #[test]
    fn assignments_stay_sorted_and_stable() {
        // suspended weavers accept jobs but do not assign them, so the
        // queue order can be observed directly
        let weaver = WeaverBuilder::new()
            .thread_cap(1)
            .build()
            .expect("valid configuration");
        weaver.suspend();
        assert_eq!(weaver.state(), WeaverState::Suspended);

        let low = NopJob::with_priority(1);
        let high = NopJob::with_priority(5);
        let mid_a = NopJob::with_priority(3);
        let mid_b = NopJob::with_priority(3);
        for job in [&low, &high, &mid_a, &mid_b] {
            weaver.enqueue_job(job.clone());
            assert_eq!(job.status(), JobStatus::Queued);
        }

        let expected: Vec<_> = [&high, &mid_a, &mid_b, &low]
            .into_iter()
            .map(JobKey::of)
            .collect();
        assert_eq!(weaver.assignment_keys(), expected);

        weaver.dequeue_all();
        weaver.shut_down();
    }

    #[test]
    fn dequeue_returns_the_job_to_new() {
        let weaver = WeaverBuilder::new()
            .thread_cap(1)
            .build()
            .expect("valid configuration");
        weaver.suspend();

        let job = NopJob::with_priority(0);
        weaver.enqueue_job(job.clone());
        assert_eq!(weaver.queue_length(), 1);

        assert!(weaver.dequeue(&job));
        assert_eq!(job.status(), JobStatus::New);
        assert_eq!(weaver.queue_length(), 0);
        assert!(!weaver.dequeue(&job));

        weaver.shut_down();
    }

    #[test]
    fn terminal_states_ignore_enqueue() {
        let weaver = Weaver::new();
        weaver.shut_down();
        assert_eq!(weaver.state(), WeaverState::Destructed);

        let job = NopJob::with_priority(0);
        weaver.enqueue_job(job.clone());
        assert_eq!(job.status(), JobStatus::New);
        assert_eq!(weaver.queue_length(), 0);
    }

    #[test]
    fn dropping_the_handle_shuts_down() {
        let weaver = Weaver::new();
        let core = weaver.core.clone();
        drop(weaver);
        assert_eq!(core.state(), WeaverState::Destructed);
        assert_eq!(core.sched.lock().inventory.len(), 0);
    }
}
