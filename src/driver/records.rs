//! Fatal error and processing exception bookkeeping.
//!
//! Both records are append-only and owned by a driver. Only the driver's worker
//! appends; any thread may read through a cloned [`Record`] handle, which always
//! reflects the latest contents.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Lifecycle step during which a fatal error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Init,
    PreProcess,
    /// A `process` failure escalated by a strict fault-tolerance policy.
    Process,
    PostProcess,
    Release,
    /// Infrastructure failure in the worker itself, e.g. a closed channel.
    Worker,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::PreProcess => "pre_process",
            Self::Process => "process",
            Self::PostProcess => "post_process",
            Self::Release => "release",
            Self::Worker => "worker",
        };
        f.write_str(label)
    }
}

/// A failure that moved a driver to `StageState::Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatalError {
    pub stage: String,
    pub phase: LifecyclePhase,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl FatalError {
    pub fn new(stage: impl Into<String>, phase: LifecyclePhase, error: &StageError) -> Self {
        Self {
            stage: stage.into(),
            phase,
            message: error.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage '{}' failed in {}: {}", self.stage, self.phase, self.message)
    }
}

/// A per-item `process` failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingException {
    pub stage: String,
    pub cause: String,
    pub recorded_at: DateTime<Utc>,
}

impl ProcessingException {
    pub fn new(stage: impl Into<String>, cause: &StageError) -> Self {
        Self {
            stage: stage.into(),
            cause: cause.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Live, append-only list shared between a driver's worker and its readers.
#[derive(Debug)]
pub struct Record<R> {
    entries: Arc<RwLock<Vec<R>>>,
}

impl<R> Clone for Record<R> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<R> Default for Record<R> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<R: Clone> Record<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, entry: R) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the entries recorded so far, oldest first.
    pub fn snapshot(&self) -> Vec<R> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<R> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

/// Item counters for one driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    /// Items for which `process` returned `Ok`.
    pub processed: u64,
    /// Items for which `process` failed.
    pub failed: u64,
}

impl DriverStats {
    /// Total number of items handed to `process`.
    pub fn total(&self) -> u64 {
        self.processed + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.processed as f64 / total as f64) * 100.0
    }
}

/// Counters updated by the worker while it runs.
#[derive(Debug, Default)]
pub(crate) struct SharedDriverStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl SharedDriverStats {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn to_stats(&self) -> DriverStats {
        DriverStats {
            processed: self.processed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}
