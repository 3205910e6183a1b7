//! Caps how many jobs may hold a resource at once.

use parking_lot::Mutex;

use crate::job::{JobKey, JobPointer};
use crate::policy::QueuePolicy;

/// Admits at most `cap` jobs concurrently.
///
/// With a cap of one this is a mutual-exclusion policy. Grants are tracked
/// per job, so a free without a matching grant (the dequeue path frees
/// unconditionally) is a no-op.
pub struct ResourceRestrictionPolicy {
    cap: usize,
    customers: Mutex<Vec<JobKey>>,
}

impl ResourceRestrictionPolicy {
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "a resource restriction needs a positive cap");
        ResourceRestrictionPolicy {
            cap,
            customers: Mutex::new(Vec::new()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// How many jobs currently hold the resource.
    pub fn holders(&self) -> usize {
        self.customers.lock().len()
    }

    fn drop_customer(&self, job: &JobPointer) {
        let key = JobKey::of(job);
        let mut customers = self.customers.lock();
        if let Some(at) = customers.iter().position(|c| *c == key) {
            customers.swap_remove(at);
        }
    }
}

impl QueuePolicy for ResourceRestrictionPolicy {
    fn can_run(&self, job: &JobPointer) -> bool {
        let mut customers = self.customers.lock();
        if customers.len() < self.cap {
            customers.push(JobKey::of(job));
            true
        } else {
            false
        }
    }

    fn release(&self, job: &JobPointer) {
        self.drop_customer(job);
    }

    fn free(&self, job: &JobPointer) {
        self.drop_customer(job);
    }
}
