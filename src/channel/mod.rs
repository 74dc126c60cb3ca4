//! Data channels connecting one stage's output to the next stage's input.
//!
//! A channel has two independent capabilities:
//!
//! - **Feeder**: the producer side. Accepts one item at a time, may be shared by
//!   any number of producers, and waits while the channel is full instead of
//!   dropping data.
//! - **ChannelSource**: the consumer side. Owned by exactly one driver worker,
//!   which retrieves items with a bounded wait.
//!
//! The in-memory backing lives in [`bounded`]. Other backings (an external
//! broker, for example) only need to honor the same bounded/blocking contract.
//!
//! # Example
//!
//! ```rust,ignore
//! use stagedrive::channel::{bounded, ChannelSource, Feeder};
//! use std::time::Duration;
//!
//! let (feeder, mut source) = bounded::<String>(16)?;
//! feeder.feed("hello".to_string()).await?;
//!
//! let item = source.poll(Duration::from_millis(50)).await?;
//! assert_eq!(item.as_deref(), Some("hello"));
//! ```

pub mod bounded;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use bounded::{bounded, ChannelFeeder, ChannelReceiver};

/// Errors that can occur on a data channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The other side of the channel is gone.
    #[error("Channel is closed")]
    Closed,

    /// A bounded channel needs room for at least one item.
    #[error("Channel capacity must be greater than 0")]
    ZeroCapacity,
}

/// Producer side of a data channel.
#[async_trait]
pub trait Feeder<T: Send + 'static>: Send + Sync {
    /// Hands one item to the channel, waiting for room if it is full.
    async fn feed(&self, item: T) -> Result<(), ChannelError>;
}

/// Consumer side of a data channel.
#[async_trait]
pub trait ChannelSource<T: Send + 'static>: Send {
    /// Waits up to `timeout` for the next item.
    ///
    /// Returns `Ok(None)` when the wait elapsed without an item.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<T>, ChannelError>;
}

/// A feeder shared between the driver that owns the channel and its producers.
pub type SharedFeeder<T> = Arc<dyn Feeder<T>>;

/// Feeder that discards every item, used at the tail of a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidFeeder;

#[async_trait]
impl<T: Send + 'static> Feeder<T> for VoidFeeder {
    async fn feed(&self, _item: T) -> Result<(), ChannelError> {
        Ok(())
    }
}
