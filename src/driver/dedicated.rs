//! Driver that runs its stage on a dedicated worker task.
//!
//! The worker pulls items from a bounded channel with a poll timeout, which
//! lets it notice a pending stop request between items without a separate
//! cancellation signal. Shutdown is cooperative: an in-flight `process` call is
//! never interrupted, so a hanging stage blocks `finish()`.
//!
//! # Worker protocol
//!
//! 1. State `Started`; `init` and `pre_process` run (failures are fatal).
//! 2. `Started -> Running`, then loop until a poll times out while
//!    `StopRequested` is pending. Each item goes through `process`; failures are
//!    recorded and, under [`FaultTolerance::Strict`], escalated to fatal.
//! 3. `post_process` runs after a clean drain (failure is fatal).
//! 4. Any fatal failure is recorded and moves the driver to `Error`.
//! 5. `release` always runs.
//! 6. `StopRequested -> Finished`, unless the driver is in `Error`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{bounded, ChannelSource, Feeder, SharedFeeder};
use crate::config::{ConfigError, DriverConfig};
use crate::error::{DriverError, StageError};
use crate::stage::{Emitter, SharedStage, Stage, StageContext};

use super::records::{
    DriverStats, FatalError, LifecyclePhase, ProcessingException, Record, SharedDriverStats,
};
use super::state::{StageState, StateCell};
use super::tolerance::FaultTolerance;
use super::StageDriver;

type BoxedSource<T> = Box<dyn ChannelSource<T>>;

/// Binds one stage to one worker task and one bounded inbound channel.
pub struct DedicatedWorkerDriver<T: Send + 'static> {
    id: Uuid,
    stage_name: String,
    stage: SharedStage<T>,
    context: Arc<dyn StageContext<T>>,
    feeder: SharedFeeder<T>,
    /// Consumer side of the channel while no worker owns it.
    source: Mutex<Option<BoxedSource<T>>>,
    /// Serializes `start`/`finish` and holds the running worker.
    worker: tokio::sync::Mutex<Option<JoinHandle<BoxedSource<T>>>>,
    poll_timeout: Duration,
    fault_tolerance: FaultTolerance,
    state: Arc<StateCell>,
    fatal_errors: Record<FatalError>,
    processing_exceptions: Record<ProcessingException>,
    stats: Arc<SharedDriverStats>,
}

impl<T: Send + 'static> DedicatedWorkerDriver<T> {
    /// Creates a driver over an existing channel.
    ///
    /// # Arguments
    ///
    /// * `stage` - The stage to run
    /// * `context` - Pipeline context handed to the stage
    /// * `feeder` - Producer side of the inbound channel
    /// * `source` - Consumer side of the same channel
    /// * `poll_timeout` - How long the worker waits for an item before re-checking for a stop
    /// * `fault_tolerance` - What to do when `process` fails
    pub fn new<S, F, C>(
        stage: S,
        context: Arc<dyn StageContext<T>>,
        feeder: F,
        source: C,
        poll_timeout: Duration,
        fault_tolerance: FaultTolerance,
    ) -> Self
    where
        S: Stage<T>,
        F: Feeder<T> + 'static,
        C: ChannelSource<T> + 'static,
    {
        let stage_name = stage.name().to_string();
        let stage: Box<dyn Stage<T>> = Box::new(stage);
        let feeder: SharedFeeder<T> = Arc::new(feeder);
        let source: BoxedSource<T> = Box::new(source);

        Self {
            id: Uuid::new_v4(),
            stage_name,
            stage: Arc::new(tokio::sync::Mutex::new(stage)),
            context,
            feeder,
            source: Mutex::new(Some(source)),
            worker: tokio::sync::Mutex::new(None),
            poll_timeout,
            fault_tolerance,
            state: Arc::new(StateCell::new()),
            fatal_errors: Record::new(),
            processing_exceptions: Record::new(),
            stats: Arc::new(SharedDriverStats::default()),
        }
    }

    /// Creates a driver with its own in-memory bounded channel.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if the configuration is invalid.
    pub fn from_config<S>(
        stage: S,
        context: Arc<dyn StageContext<T>>,
        config: &DriverConfig,
    ) -> Result<Self, ConfigError>
    where
        S: Stage<T>,
    {
        config.validate()?;
        let (feeder, source) = bounded(config.queue_capacity)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        Ok(Self::new(
            stage,
            context,
            feeder,
            source,
            config.poll_timeout,
            config.fault_tolerance,
        ))
    }

    /// Unique identifier of this driver, used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the driven stage.
    pub fn name(&self) -> &str {
        &self.stage_name
    }

    pub fn fault_tolerance(&self) -> FaultTolerance {
        self.fault_tolerance
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Item counters since the driver was created.
    pub fn stats(&self) -> DriverStats {
        self.stats.to_stats()
    }

    fn spawn_worker(&self, source: BoxedSource<T>) -> JoinHandle<BoxedSource<T>> {
        let worker = Worker {
            driver_id: self.id,
            stage_name: self.stage_name.clone(),
            stage: Arc::clone(&self.stage),
            context: Arc::clone(&self.context),
            poll_timeout: self.poll_timeout,
            fault_tolerance: self.fault_tolerance,
            state: Arc::clone(&self.state),
            fatal_errors: self.fatal_errors.clone(),
            processing_exceptions: self.processing_exceptions.clone(),
            stats: Arc::clone(&self.stats),
        };
        tokio::spawn(worker.run(source))
    }
}

#[async_trait]
impl<T: Send + 'static> StageDriver<T> for DedicatedWorkerDriver<T> {
    async fn start(&self) -> Result<(), DriverError> {
        let mut worker = self.worker.lock().await;

        let state = self.state.get();
        if state != StageState::Stopped {
            return Err(DriverError::illegal_state("start", state));
        }

        let source = self
            .source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| DriverError::Handshake("inbound channel is not available".to_string()))?;

        info!(
            driver_id = %self.id,
            stage = %self.stage_name,
            fault_tolerance = %self.fault_tolerance,
            "Starting stage driver"
        );
        *worker = Some(self.spawn_worker(source));

        let state = self
            .state
            .wait_for(|s| matches!(s, StageState::Running | StageState::Error))
            .await?;
        if state == StageState::Error {
            warn!(
                driver_id = %self.id,
                stage = %self.stage_name,
                fatal_errors = self.fatal_errors.len(),
                "Stage failed during startup"
            );
        }

        Ok(())
    }

    async fn finish(&self) -> Result<(), DriverError> {
        let mut worker = self.worker.lock().await;

        let state = self.state.get();
        if state == StageState::Stopped {
            return Err(DriverError::illegal_state("finish", state));
        }

        info!(driver_id = %self.id, stage = %self.stage_name, "Finishing stage driver");

        // A previous finish() may have been cancelled after requesting the stop.
        self.state
            .wait_for(|s| {
                matches!(
                    s,
                    StageState::Running
                        | StageState::StopRequested
                        | StageState::Finished
                        | StageState::Error
                )
            })
            .await?;

        // A worker that already failed keeps its Error state.
        if self
            .state
            .test_and_set(StageState::Running, StageState::StopRequested)
        {
            debug!(driver_id = %self.id, stage = %self.stage_name, "Stop requested, draining");
        }

        self.state
            .wait_for(|s| matches!(s, StageState::Finished | StageState::Error))
            .await?;

        // The handle stays in place until joined, so a cancelled join can be retried.
        if let Some(handle) = worker.as_mut() {
            let joined = handle.await;
            *worker = None;
            let source = joined.map_err(|e| DriverError::WorkerJoin(e.to_string()))?;
            *self.source.lock().unwrap_or_else(|e| e.into_inner()) = Some(source);
        }

        let stats = self.stats.to_stats();
        if self
            .state
            .test_and_set(StageState::Finished, StageState::Stopped)
        {
            info!(
                driver_id = %self.id,
                stage = %self.stage_name,
                processed = stats.processed,
                failed = stats.failed,
                "Stage driver stopped"
            );
        } else {
            warn!(
                driver_id = %self.id,
                stage = %self.stage_name,
                state = %self.state.get(),
                fatal_errors = self.fatal_errors.len(),
                processed = stats.processed,
                failed = stats.failed,
                "Stage driver finished with fatal errors"
            );
        }

        Ok(())
    }

    fn feeder(&self) -> SharedFeeder<T> {
        Arc::clone(&self.feeder)
    }

    fn stage(&self) -> SharedStage<T> {
        Arc::clone(&self.stage)
    }

    fn state(&self) -> StageState {
        self.state.get()
    }

    fn fatal_errors(&self) -> Record<FatalError> {
        self.fatal_errors.clone()
    }

    fn processing_exceptions(&self) -> Record<ProcessingException> {
        self.processing_exceptions.clone()
    }
}

/// Everything the worker task needs, cloned out of the driver.
struct Worker<T: Send + 'static> {
    driver_id: Uuid,
    stage_name: String,
    stage: SharedStage<T>,
    context: Arc<dyn StageContext<T>>,
    poll_timeout: Duration,
    fault_tolerance: FaultTolerance,
    state: Arc<StateCell>,
    fatal_errors: Record<FatalError>,
    processing_exceptions: Record<ProcessingException>,
    stats: Arc<SharedDriverStats>,
}

impl<T: Send + 'static> Worker<T> {
    /// Runs the whole stage lifecycle and hands the channel back on exit.
    async fn run(self, mut source: BoxedSource<T>) -> BoxedSource<T> {
        let stage = Arc::clone(&self.stage);
        let mut stage = stage.lock().await;

        self.state.set(StageState::Started);

        if let Err((phase, error)) = self.drive(&mut stage, &mut source).await {
            self.fail(phase, &error);
        }

        debug!(driver_id = %self.driver_id, stage = %self.stage_name, "Running release");
        if let Err(error) = guarded(stage.release()).await {
            self.fail(LifecyclePhase::Release, &error);
        }

        if self
            .state
            .test_and_set(StageState::StopRequested, StageState::Finished)
        {
            debug!(driver_id = %self.driver_id, stage = %self.stage_name, "Stage finished");
        }

        source
    }

    async fn drive(
        &self,
        stage: &mut Box<dyn Stage<T>>,
        source: &mut BoxedSource<T>,
    ) -> Result<(), (LifecyclePhase, StageError)> {
        let emitter = Emitter::resolve(Arc::clone(&self.context), &self.stage_name);

        debug!(driver_id = %self.driver_id, stage = %self.stage_name, "Running init");
        guarded(stage.init(Arc::clone(&self.context), emitter))
            .await
            .map_err(|e| (LifecyclePhase::Init, e))?;

        debug!(driver_id = %self.driver_id, stage = %self.stage_name, "Running pre_process");
        guarded(stage.pre_process())
            .await
            .map_err(|e| (LifecyclePhase::PreProcess, e))?;

        self.state
            .test_and_set(StageState::Started, StageState::Running);
        info!(driver_id = %self.driver_id, stage = %self.stage_name, "Stage running");

        while !self.state.is_in(&[StageState::Error]) {
            let item = match source.poll(self.poll_timeout).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    if self.state.is_in(&[StageState::StopRequested]) {
                        debug!(driver_id = %self.driver_id, stage = %self.stage_name, "Channel drained");
                        break;
                    }
                    continue;
                }
                Err(e) => return Err((LifecyclePhase::Worker, StageError::Channel(e))),
            };

            match guarded(stage.process(item)).await {
                Ok(()) => self.stats.record_processed(),
                Err(error) => {
                    self.stats.record_failed();
                    self.processing_exceptions
                        .push(ProcessingException::new(&self.stage_name, &error));

                    if self.fault_tolerance.escalates() {
                        return Err((LifecyclePhase::Process, error));
                    }
                    if self.fault_tolerance == FaultTolerance::Continue {
                        warn!(
                            driver_id = %self.driver_id,
                            stage = %self.stage_name,
                            error = %error,
                            "Item failed, continuing"
                        );
                    } else {
                        error!(
                            driver_id = %self.driver_id,
                            stage = %self.stage_name,
                            error = %error,
                            "Item failed, recorded for inspection"
                        );
                    }
                }
            }
        }

        debug!(driver_id = %self.driver_id, stage = %self.stage_name, "Running post_process");
        guarded(stage.post_process())
            .await
            .map_err(|e| (LifecyclePhase::PostProcess, e))?;

        Ok(())
    }

    /// Records a fatal error, then moves the driver to `Error`.
    fn fail(&self, phase: LifecyclePhase, error: &StageError) {
        error!(
            driver_id = %self.driver_id,
            stage = %self.stage_name,
            phase = %phase,
            error = %error,
            "Fatal stage error"
        );
        self.fatal_errors
            .push(FatalError::new(&self.stage_name, phase, error));
        self.state.set(StageState::Error);
    }
}

/// Awaits a stage hook, turning a panic into `StageError::Panicked`.
async fn guarded<F>(hook: F) -> Result<(), StageError>
where
    F: Future<Output = Result<(), StageError>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(StageError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
