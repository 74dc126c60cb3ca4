//! In-memory bounded FIFO channel backed by `tokio::sync::mpsc`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelError, ChannelSource, Feeder};

/// Producer endpoint of an in-memory bounded channel. Cheap to clone.
#[derive(Debug)]
pub struct ChannelFeeder<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for ChannelFeeder<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> ChannelFeeder<T> {
    /// Number of items that can still be enqueued without waiting.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

#[async_trait]
impl<T: Send + 'static> Feeder<T> for ChannelFeeder<T> {
    async fn feed(&self, item: T) -> Result<(), ChannelError> {
        self.tx.send(item).await.map_err(|_| ChannelError::Closed)
    }
}

/// Consumer endpoint of an in-memory bounded channel.
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> ChannelReceiver<T> {
    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[async_trait]
impl<T: Send + 'static> ChannelSource<T> for ChannelReceiver<T> {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<T>, ChannelError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => Err(ChannelError::Closed),
            Err(_) => Ok(None),
        }
    }
}

/// Creates a bounded channel holding at most `capacity` items.
///
/// # Errors
///
/// Returns `ChannelError::ZeroCapacity` if `capacity` is 0.
pub fn bounded<T>(capacity: usize) -> Result<(ChannelFeeder<T>, ChannelReceiver<T>), ChannelError> {
    if capacity == 0 {
        return Err(ChannelError::ZeroCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((ChannelFeeder { tx }, ChannelReceiver { rx }))
}
