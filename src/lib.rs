//! stagedrive: runtime drivers for staged data pipelines.
//!
//! A pipeline is a chain of stages connected by bounded channels. Each stage is
//! run by a driver that owns its lifecycle, its worker task and its error
//! bookkeeping.

// Core modules
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod stage;

// Re-export commonly used types
pub use channel::{bounded, ChannelError, ChannelFeeder, ChannelReceiver, ChannelSource, Feeder};
pub use config::{ConfigError, DriverConfig};
pub use driver::{
    DedicatedWorkerDriver, DriverStats, FatalError, FaultTolerance, LifecyclePhase,
    ProcessingException, Record, StageDriver, StageState,
};
pub use error::{DriverError, StageError};
pub use stage::{Emitter, InMemoryContext, Stage, StageContext, StageEvent, StageEventListener};
