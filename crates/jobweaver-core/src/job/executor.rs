//! Execution chains: decorators invoked around a job's body.
//!
//! Every job owns a chain of executor links ending in the default link. A
//! wrapper decorates whatever chain was installed before it; invoking the
//! chain runs `begin` from the outside in, the job body, then `end` back out.
//! After a run has unwound, the chain is pruned of one-shot wrappers.

use crate::error::JobError;
use crate::job::{JobKey, JobPointer, JobStatus};
use crate::weaver::WorkerThread;

/// Pre/post behavior wrapped around a job's execution.
///
/// A wrapper receives the chain link it decorates and decides when (and
/// whether) to delegate to it. The default implementations delegate
/// unchanged.
pub trait ExecuteWrapper: Send + Sync {
    fn begin(&self, inner: &ExecutorChain, job: &JobPointer, thread: &WorkerThread) {
        inner.begin(job, thread);
    }

    fn end(&self, inner: &ExecutorChain, job: &JobPointer, thread: &WorkerThread) {
        inner.end(job, thread);
    }

    /// One-shot wrappers are dropped from the chain once the run has
    /// unwound. They must not be referenced by any later step.
    fn discard_after_run(&self) -> bool {
        false
    }
}

/// One link of a job's execution chain.
///
/// The chain is owned by the job and taken out for the duration of a run, so
/// wrapper callbacks are free to lock the job again.
pub enum ExecutorChain {
    /// Innermost link: the default begin/end behavior around the job body.
    Default,
    /// A decorator around an inner link.
    Wrapped {
        wrapper: Box<dyn ExecuteWrapper>,
        inner: Box<ExecutorChain>,
    },
}

impl ExecutorChain {
    /// Runs the begin side of this link and everything inside it.
    pub fn begin(&self, job: &JobPointer, thread: &WorkerThread) {
        match self {
            ExecutorChain::Default => job.default_begin(job, thread),
            ExecutorChain::Wrapped { wrapper, inner } => wrapper.begin(inner, job, thread),
        }
    }

    /// Runs the end side of this link and everything inside it.
    pub fn end(&self, job: &JobPointer, thread: &WorkerThread) {
        match self {
            ExecutorChain::Default => job.default_end(job, thread),
            ExecutorChain::Wrapped { wrapper, inner } => wrapper.end(inner, job, thread),
        }
    }

    /// Installs `wrapper` as the new outermost link.
    pub(crate) fn wrap(self, wrapper: Box<dyn ExecuteWrapper>) -> Self {
        ExecutorChain::Wrapped {
            wrapper,
            inner: Box::new(self),
        }
    }

    /// Drops every link that asked to be discarded after the run.
    pub(crate) fn pruned(self) -> Self {
        match self {
            ExecutorChain::Wrapped { wrapper, inner } => {
                let inner = inner.pruned();
                if wrapper.discard_after_run() {
                    inner
                } else {
                    ExecutorChain::Wrapped {
                        wrapper,
                        inner: Box::new(inner),
                    }
                }
            }
            chain => chain,
        }
    }
}

/// The default `execute` behavior: run the chain around the job body and
/// derive the final status from the body's outcome.
///
/// Exposed so that jobs overriding [`Job::execute`](crate::job::Job::execute)
/// can decorate it instead of re-implementing it.
pub fn execute_with_chain(job: &JobPointer, thread: &WorkerThread) {
    let chain = job.common().take_chain();
    job.set_status(JobStatus::Running);
    chain.begin(job, thread);
    let outcome = job.run(job, thread);
    let status = match &outcome {
        Ok(()) => JobStatus::Success,
        Err(JobError::Aborted) => JobStatus::Aborted,
        Err(JobError::Failed { reason }) => {
            tracing::debug!(job = %JobKey::of(job), reason = %reason, "job reported failure");
            JobStatus::Failed
        }
    };
    job.set_status(status);
    chain.end(job, thread);
    job.common().put_chain(chain.pruned());
}
