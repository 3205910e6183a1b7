//! Weaver lifecycle states and their operation permissions.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a weaver.
///
/// Transitions:
/// - InConstruction -> WorkingHard (during construction)
/// - WorkingHard <-> Suspending -> Suspended -> WorkingHard
/// - any non-terminal state -> ShuttingDown -> Destructed
///
/// The state is stored atomically so observation is lock-free; transitions
/// always happen under the weaver mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WeaverState {
    InConstruction = 0,
    WorkingHard = 1,
    /// Draining active workers towards Suspended; no new assignments.
    Suspending = 2,
    Suspended = 3,
    ShuttingDown = 4,
    Destructed = 5,
}

impl WeaverState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WeaverState::InConstruction,
            1 => WeaverState::WorkingHard,
            2 => WeaverState::Suspending,
            3 => WeaverState::Suspended,
            4 => WeaverState::ShuttingDown,
            5 => WeaverState::Destructed,
            _ => unreachable!("invalid weaver state {raw}"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WeaverState::InConstruction => "in construction",
            WeaverState::WorkingHard => "working hard",
            WeaverState::Suspending => "suspending",
            WeaverState::Suspended => "suspended",
            WeaverState::ShuttingDown => "shutting down",
            WeaverState::Destructed => "destructed",
        }
    }

    /// New jobs are accepted while the weaver can still run or resume them.
    pub fn accepts_new_jobs(self) -> bool {
        matches!(
            self,
            WeaverState::WorkingHard | WeaverState::Suspending | WeaverState::Suspended
        )
    }

    /// Dequeueing stays possible all the way through shutdown.
    pub fn allows_dequeue(self) -> bool {
        matches!(
            self,
            WeaverState::WorkingHard
                | WeaverState::Suspending
                | WeaverState::Suspended
                | WeaverState::ShuttingDown
        )
    }

    /// Only a weaver that is working hard hands out assignments.
    pub fn assigns_jobs(self) -> bool {
        self == WeaverState::WorkingHard
    }

    pub fn can_suspend(self) -> bool {
        self == WeaverState::WorkingHard
    }

    pub fn can_resume(self) -> bool {
        matches!(self, WeaverState::Suspending | WeaverState::Suspended)
    }

    /// Workers park in these states instead of polling.
    pub(crate) fn parks_workers(self) -> bool {
        matches!(self, WeaverState::InConstruction | WeaverState::Suspended)
    }

    /// Past the point of no return; workers are leaving or gone.
    pub fn is_winding_down(self) -> bool {
        matches!(self, WeaverState::ShuttingDown | WeaverState::Destructed)
    }
}
