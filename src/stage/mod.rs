//! Stage contract: the unit of business logic a driver executes.
//!
//! A stage exposes five lifecycle hooks:
//!
//! 1. `init`: receives the shared context and its resolved [`Emitter`]
//! 2. `pre_process`: one-time setup before the first item
//! 3. `process`: called once per item, single-threaded on the driver's worker
//! 4. `post_process`: one-time teardown after the channel has drained
//! 5. `release`: always runs last, even after a fatal error
//!
//! Only `process` is required. Failures from `process` are governed by the
//! driver's [`FaultTolerance`](crate::driver::FaultTolerance) policy; failures
//! from every other hook are fatal.

pub mod context;
pub mod emitter;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StageError;

pub use context::{InMemoryContext, StageContext, StageEvent, StageEventListener};
pub use emitter::Emitter;

/// Name used by stages that do not override [`Stage::name`].
pub const DEFAULT_STAGE_NAME: &str = "common";

/// A unit of work in a pipeline.
#[async_trait]
pub trait Stage<T: Send + 'static>: Send + 'static {
    /// Stage name, used for routing and logging. Should be unique per pipeline.
    fn name(&self) -> &str {
        DEFAULT_STAGE_NAME
    }

    /// Called once on the worker before `pre_process`.
    async fn init(
        &mut self,
        _context: Arc<dyn StageContext<T>>,
        _emitter: Emitter<T>,
    ) -> Result<(), StageError> {
        Ok(())
    }

    async fn pre_process(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Processes one item.
    async fn process(&mut self, item: T) -> Result<(), StageError>;

    async fn post_process(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Releases resources. Runs whether the stage finished cleanly or not.
    async fn release(&mut self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Boxed stage shared between a driver and its worker.
///
/// The worker holds the lock for its whole run, so locking from outside
/// waits until the worker has exited.
pub type SharedStage<T> = Arc<tokio::sync::Mutex<Box<dyn Stage<T>>>>;

/// Stage that passes every item to its downstream unchanged.
pub struct Forward<T: Send + 'static> {
    name: String,
    emitter: Option<Emitter<T>>,
    _item: PhantomData<fn(T)>,
}

impl<T: Send + 'static> Forward<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emitter: None,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Stage<T> for Forward<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(
        &mut self,
        _context: Arc<dyn StageContext<T>>,
        emitter: Emitter<T>,
    ) -> Result<(), StageError> {
        self.emitter = Some(emitter);
        Ok(())
    }

    async fn process(&mut self, item: T) -> Result<(), StageError> {
        match &self.emitter {
            Some(emitter) => emitter.emit(item).await,
            None => Err(StageError::lifecycle(format!(
                "stage '{}' processed an item before init",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{bounded, ChannelSource};
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl Stage<u32> for Noop {
        async fn process(&mut self, _item: u32) -> Result<(), StageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_hooks_are_noops() {
        let mut stage = Noop;
        assert_eq!(stage.name(), DEFAULT_STAGE_NAME);
        assert!(stage.pre_process().await.is_ok());
        assert!(stage.process(1).await.is_ok());
        assert!(stage.post_process().await.is_ok());
        assert!(stage.release().await.is_ok());
    }

    #[tokio::test]
    async fn test_forward_emits_downstream() {
        let (feeder, mut source) = bounded::<u32>(4).unwrap();
        let context: Arc<dyn StageContext<u32>> =
            Arc::new(InMemoryContext::<u32>::new().with_downstream("fwd", Arc::new(feeder)));

        let mut stage = Forward::new("fwd");
        let emitter = Emitter::resolve(Arc::clone(&context), "fwd");
        stage.init(context, emitter).await.unwrap();
        stage.process(7).await.unwrap();

        assert_eq!(source.poll(Duration::from_millis(10)).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_forward_before_init_fails() {
        let mut stage = Forward::<u32>::new("fwd");
        let err = stage.process(1).await.unwrap_err();
        assert!(matches!(err, StageError::Lifecycle(_)));
    }
}
