//! Stage drivers: runtime controllers that execute a stage's lifecycle.
//!
//! A driver owns one stage, its inbound channel, its lifecycle state and two
//! records: fatal errors and tolerated processing exceptions. An orchestrator
//! talks to it through the [`StageDriver`] control API.
//!
//! # Lifecycle
//!
//! ```text
//!   start()                                  finish()
//!  ────────►                                 ────────►
//! STOPPED ──► STARTED ──► RUNNING ──► STOP_REQUESTED ──► FINISHED ──► STOPPED
//!                │           │              │
//!                └───────────┴──────────────┴──────► ERROR (terminal)
//! ```
//!
//! Orchestrators usually start drivers downstream-to-upstream, so consumers are
//! ready before producers, feed the head stage, then finish drivers
//! upstream-to-downstream so each one drains before its consumer stops.
//!
//! # Error handling
//!
//! Fatal failures are never returned from `start()` or `finish()`. The driver
//! settles in `StageState::Error` instead, and the failure is available from
//! [`StageDriver::fatal_errors`]. Check `state()` after `finish()` returns to
//! know whether the run was clean.
//!
//! # Example
//!
//! ```rust,ignore
//! use stagedrive::driver::{DedicatedWorkerDriver, FaultTolerance, StageDriver, StageState};
//! use stagedrive::channel::bounded;
//! use std::time::Duration;
//!
//! let (feeder, source) = bounded(64)?;
//! let driver = DedicatedWorkerDriver::new(
//!     MyStage::default(),
//!     context,
//!     feeder,
//!     source,
//!     Duration::from_millis(50),
//!     FaultTolerance::Checked,
//! );
//!
//! driver.start().await?;
//! driver.feeder().feed(item).await?;
//! driver.finish().await?;
//!
//! assert_eq!(driver.state(), StageState::Stopped);
//! println!("{} items failed", driver.processing_exceptions().len());
//! ```

pub mod dedicated;
pub mod records;
pub mod state;
pub mod tolerance;

use async_trait::async_trait;

use crate::channel::SharedFeeder;
use crate::error::DriverError;
use crate::stage::SharedStage;

pub use dedicated::DedicatedWorkerDriver;
pub use records::{DriverStats, FatalError, LifecyclePhase, ProcessingException, Record};
pub use state::{StageState, StateCell};
pub use tolerance::FaultTolerance;

/// Control API of a stage driver.
#[async_trait]
pub trait StageDriver<T: Send + 'static>: Send + Sync {
    /// Spawns the worker and waits until the stage is `Running` or has failed.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::IllegalState` unless the driver is `Stopped`.
    async fn start(&self) -> Result<(), DriverError>;

    /// Requests a stop, waits for the queued items to drain and the worker to
    /// exit, then returns the driver to `Stopped`. A driver that failed stays in
    /// `Error`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::IllegalState` if the driver is already `Stopped`.
    async fn finish(&self) -> Result<(), DriverError>;

    /// Producer endpoint of this driver's inbound channel.
    fn feeder(&self) -> SharedFeeder<T>;

    fn stage(&self) -> SharedStage<T>;

    fn state(&self) -> StageState;

    /// Live handle to the fatal error record.
    fn fatal_errors(&self) -> Record<FatalError>;

    /// Live handle to the processing exception record.
    fn processing_exceptions(&self) -> Record<ProcessingException>;
}
