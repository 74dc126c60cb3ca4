//! Error types for stage pipeline operations.
//!
//! Two disjoint error families live here:
//! - `StageError`: what a stage's lifecycle hooks return. The driver decides
//!   whether one is fatal or a tolerated processing exception.
//! - `DriverError`: misuse of the driver control API or a broken handshake
//!   between the controller and the worker.
//!
//! Channel and configuration errors live next to their modules.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::driver::StageState;

/// Errors raised by a stage's lifecycle hooks.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Lifecycle hook failed: {0}")]
    Lifecycle(String),

    #[error("Branch '{0}' is not registered in the stage context")]
    UnknownBranch(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Shorthand for a per-item processing failure.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    /// Shorthand for an init/pre-process/post-process/release failure.
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle(message.into())
    }
}

/// Errors surfaced by the driver control API.
///
/// Fatal stage failures are never returned here; they land in the driver's
/// fatal error record and move it to `StageState::Error`.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Cannot {operation} driver in state {state}")]
    IllegalState {
        operation: &'static str,
        state: StageState,
    },

    #[error("Worker task could not be joined: {0}")]
    WorkerJoin(String),

    #[error("Lost state handshake with worker: {0}")]
    Handshake(String),
}

impl DriverError {
    pub(crate) fn illegal_state(operation: &'static str, state: StageState) -> Self {
        Self::IllegalState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = StageError::processing("bad input");
        assert!(err.to_string().contains("bad input"));

        let err = StageError::UnknownBranch("audit".to_string());
        assert!(err.to_string().contains("audit"));

        let err = StageError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "disk full");

        let err = StageError::from(ChannelError::Closed);
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::illegal_state("start", StageState::Running);
        assert_eq!(err.to_string(), "Cannot start driver in state RUNNING");

        let err = DriverError::WorkerJoin("task panicked".to_string());
        assert!(err.to_string().contains("task panicked"));
    }
}
