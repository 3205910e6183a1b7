//! jobweaver-core
//!
//! An in-process worker pool that weaves heterogeneous jobs onto a bounded
//! set of worker threads.
//!
//! The crate is split into small modules:
//! - job: the Job contract, status tracking, execution chains, collections
//! - policy: admission predicates consulted before a job may run
//! - weaver: the queue itself, its worker inventory and lifecycle states
//! - observability: status snapshots and the observer surface
//! - error: crate-level error types

pub mod error;
pub mod job;
pub mod observability;
pub mod policy;
pub mod weaver;

pub use error::{BuildError, JobError};
pub use job::{ExecuteWrapper, ExecutorChain, Job, JobCollection, JobCommon, JobPointer, JobStatus};
pub use observability::{WeaverCounts, WeaverObserver};
pub use policy::{DependencyPolicy, QueuePolicy, ResourceRestrictionPolicy};
pub use weaver::{LockedQueue, QueueHandle, Weaver, WeaverBuilder, WeaverState, WorkerThread};
