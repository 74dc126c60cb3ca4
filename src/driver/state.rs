//! Driver lifecycle state and the cell that publishes it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::error::DriverError;

/// Lifecycle state of a stage driver.
///
/// Normal path: `Stopped -> Started -> Running -> StopRequested -> Finished -> Stopped`.
/// Any state past `Stopped` may diverge to `Error`, which has no way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    /// Initial state. Nothing is running and all resources are released.
    Stopped,
    /// Worker spawned, `init`/`pre_process` in progress.
    Started,
    /// Accepting and processing items.
    Running,
    /// Stop requested; the worker drains queued items, then stops.
    StopRequested,
    /// `post_process` and `release` done, worker about to exit.
    Finished,
    /// A fatal lifecycle failure occurred. Terminal.
    Error,
}

impl StageState {
    /// Whether this state is a resting point of the driver.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition(self, next: StageState) -> bool {
        use StageState::*;
        match (self, next) {
            (Error, _) => false,
            (Stopped, Started)
            | (Started, Running)
            | (Running, StopRequested)
            | (StopRequested, Finished)
            | (Finished, Stopped) => true,
            (Stopped, Error) => false,
            (_, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "STOPPED",
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::StopRequested => "STOP_REQUESTED",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Per-driver state holder.
///
/// Every write goes through the watch channel's lock and wakes all waiters,
/// including writes of `Error`. Waiters evaluate their predicate against the
/// latest value, so a change that happens between a check and a wait is never
/// missed.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<StageState>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StageState::Stopped);
        Self { tx }
    }

    pub fn get(&self) -> StageState {
        *self.tx.borrow()
    }

    /// Unconditionally stores `next` and notifies waiters. Returns the previous state.
    pub fn set(&self, next: StageState) -> StageState {
        let previous = self.tx.send_replace(next);
        if previous != next && !previous.can_transition(next) {
            warn!(from = %previous, to = %next, "Unexpected stage state transition");
        }
        previous
    }

    /// Whether the current state is one of `states`.
    pub fn is_in(&self, states: &[StageState]) -> bool {
        states.contains(&*self.tx.borrow())
    }

    /// Moves to `next` only if the current state is `expected`, as one atomic step.
    pub fn test_and_set(&self, expected: StageState, next: StageState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == expected {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    ///
    /// Returns immediately if the current state already satisfies it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<StageState, DriverError>
    where
        F: FnMut(StageState) -> bool + Send,
    {
        let mut rx = self.tx.subscribe();
        let observed = rx.wait_for(|state| predicate(*state)).await;
        match observed {
            Ok(state) => Ok(*state),
            Err(e) => Err(DriverError::Handshake(e.to_string())),
        }
    }
}
