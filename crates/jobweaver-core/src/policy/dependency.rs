//! Dependency ordering between jobs.
//!
//! Design:
//! - Forward edges: job -> jobs it waits for
//! - Reverse edges: job -> jobs waiting for it
//! - Invariant: both maps are kept in sync
//!
//! A job is admitted once it has no outgoing edges left. Edges that mention
//! a job are resolved when that job completes or leaves the queue, which is
//! what unblocks its dependents.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::job::{JobKey, JobPointer};
use crate::policy::QueuePolicy;

#[derive(Default)]
struct DependencyGraph {
    /// Forward edges: job -> jobs it waits for.
    edges: HashMap<JobKey, HashSet<JobKey>>,
    /// Reverse edges: job -> jobs waiting for it.
    reverse_edges: HashMap<JobKey, HashSet<JobKey>>,
}

impl DependencyGraph {
    fn add(&mut self, dependent: JobKey, dependee: JobKey) {
        self.edges.entry(dependent).or_default().insert(dependee);
        self.reverse_edges
            .entry(dependee)
            .or_default()
            .insert(dependent);
    }

    fn remove(&mut self, dependent: JobKey, dependee: JobKey) -> bool {
        let mut removed = false;
        if let Entry::Occupied(mut e) = self.edges.entry(dependent) {
            removed = e.get_mut().remove(&dependee);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(dependee) {
            e.get_mut().remove(&dependent);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        removed
    }

    /// Drops every edge that mentions `job`, in either direction.
    fn resolve(&mut self, job: JobKey) {
        if let Some(dependees) = self.edges.remove(&job) {
            for dependee in dependees {
                if let Entry::Occupied(mut e) = self.reverse_edges.entry(dependee) {
                    e.get_mut().remove(&job);
                    if e.get().is_empty() {
                        e.remove_entry();
                    }
                }
            }
        }
        if let Some(dependents) = self.reverse_edges.remove(&job) {
            for dependent in dependents {
                if let Entry::Occupied(mut e) = self.edges.entry(dependent) {
                    e.get_mut().remove(&job);
                    if e.get().is_empty() {
                        e.remove_entry();
                    }
                }
            }
        }
    }

    fn has_dependencies(&self, job: JobKey) -> bool {
        self.edges.get(&job).map(|d| !d.is_empty()).unwrap_or(false)
    }
}

/// Admits a job only after every job it depends on has completed.
///
/// `add_dependency` assigns the policy to both ends of the edge, so that
/// either side resolves its edges when it finishes or leaves the queue. A
/// rolled-back admission must not resolve anything, which is why `release`
/// only resolves once the job has actually reached a terminal status.
pub struct DependencyPolicy {
    weak_self: std::sync::Weak<DependencyPolicy>,
    graph: Mutex<DependencyGraph>,
}

impl DependencyPolicy {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| DependencyPolicy {
            weak_self: weak.clone(),
            graph: Mutex::new(DependencyGraph::default()),
        })
    }

    /// Declares that `dependent` waits for `dependee`.
    pub fn add_dependency(&self, dependent: &JobPointer, dependee: &JobPointer) {
        if let Some(policy) = self.weak_self.upgrade() {
            let policy: Arc<dyn QueuePolicy> = policy;
            dependent.common().assign_queue_policy(policy.clone());
            dependee.common().assign_queue_policy(policy);
        }
        self.graph
            .lock()
            .add(JobKey::of(dependent), JobKey::of(dependee));
    }

    /// Removes a single previously declared dependency. Returns whether the
    /// edge existed.
    pub fn remove_dependency(&self, dependent: &JobPointer, dependee: &JobPointer) -> bool {
        self.graph
            .lock()
            .remove(JobKey::of(dependent), JobKey::of(dependee))
    }

    pub fn has_unresolved_dependencies(&self, job: &JobPointer) -> bool {
        self.graph.lock().has_dependencies(JobKey::of(job))
    }

    fn resolve(&self, job: &JobPointer) {
        trace!(job = %JobKey::of(job), "resolving dependencies");
        self.graph.lock().resolve(JobKey::of(job));
    }
}

impl QueuePolicy for DependencyPolicy {
    fn can_run(&self, job: &JobPointer) -> bool {
        !self.has_unresolved_dependencies(job)
    }

    fn release(&self, job: &JobPointer) {
        // only a finished job unblocks its dependents; a rollback release
        // arrives while the job is still queued
        if job.status().is_terminal() {
            self.resolve(job);
        }
    }

    fn free(&self, job: &JobPointer) {
        self.resolve(job);
    }
}
