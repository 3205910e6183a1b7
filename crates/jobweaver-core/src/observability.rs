//! Status views and the observer surface.

use serde::{Deserialize, Serialize};

use crate::job::JobPointer;
use crate::weaver::{WeaverState, WorkerThread};

/// Point-in-time counters of a weaver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaverCounts {
    /// Jobs waiting in the assignment list.
    pub queued: usize,
    /// Workers currently executing a job.
    pub active: usize,
    /// Worker threads owned by the weaver.
    pub inventory: usize,
    pub inventory_max: usize,
    pub state: WeaverState,
}

/// Receives weaver lifecycle notifications.
///
/// Every method defaults to a no-op; implement the ones you care about.
/// Observers are invoked synchronously, sometimes with the weaver mutex
/// held: they must return quickly and must not call back into the weaver.
pub trait WeaverObserver: Send + Sync {
    fn state_changed(&self, state: WeaverState) {
        let _ = state;
    }

    /// The weaver finished draining its active workers after a suspend.
    fn suspended(&self) {}

    /// The weaver went idle: the queue is empty and no worker is busy.
    fn finished(&self) {}

    fn thread_started(&self, thread: &WorkerThread) {
        let _ = thread;
    }

    fn thread_busy(&self, thread: &WorkerThread, job: &JobPointer) {
        let _ = (thread, job);
    }

    /// A worker went to sleep waiting for an assignable job.
    fn thread_suspended(&self, thread: &WorkerThread) {
        let _ = thread;
    }

    fn thread_exited(&self, thread: &WorkerThread) {
        let _ = thread;
    }

    /// A job reached a terminal status. For collections this fires once,
    /// after the last element has finished.
    fn job_done(&self, job: &JobPointer) {
        let _ = job;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_serialize_round_trip() {
        let counts = WeaverCounts {
            queued: 3,
            active: 2,
            inventory: 4,
            inventory_max: 8,
            state: WeaverState::WorkingHard,
        };

        let serialized = serde_json::to_string(&counts).unwrap();
        let deserialized: WeaverCounts = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.queued, 3);
        assert_eq!(deserialized.active, 2);
        assert_eq!(deserialized.inventory, 4);
        assert_eq!(deserialized.inventory_max, 8);
        assert_eq!(deserialized.state, WeaverState::WorkingHard);
    }
}
