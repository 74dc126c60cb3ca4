//! Outbound side of a stage.

use std::sync::Arc;

use tracing::trace;

use crate::channel::{SharedFeeder, VoidFeeder};
use crate::error::StageError;

use super::context::StageContext;

/// Writes a stage's output to the next stage or to a named branch.
///
/// The downstream feeder is resolved once, when the emitter is built by the
/// driver, rather than on first use. A stage with nothing downstream gets a
/// [`VoidFeeder`], so emitting at the tail of a pipeline is a no-op.
pub struct Emitter<T: Send + 'static> {
    stage: String,
    downstream: SharedFeeder<T>,
    context: Arc<dyn StageContext<T>>,
}

impl<T: Send + 'static> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            downstream: Arc::clone(&self.downstream),
            context: Arc::clone(&self.context),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    /// Resolves the downstream feeder of `stage` from the context.
    pub fn resolve(context: Arc<dyn StageContext<T>>, stage: &str) -> Self {
        let downstream = context
            .downstream_feeder(stage)
            .unwrap_or_else(|| Arc::new(VoidFeeder) as SharedFeeder<T>);
        Self {
            stage: stage.to_string(),
            downstream,
            context,
        }
    }

    /// Name of the stage this emitter belongs to.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Sends an item to the next stage, waiting while its channel is full.
    pub async fn emit(&self, item: T) -> Result<(), StageError> {
        trace!(stage = %self.stage, "Emitting item downstream");
        self.downstream.feed(item).await?;
        Ok(())
    }

    /// Sends an item to the entry stage of `branch`, bypassing the
    /// regular downstream.
    ///
    /// # Errors
    ///
    /// Returns `StageError::UnknownBranch` if the context has no such branch.
    pub async fn emit_to(&self, branch: &str, item: T) -> Result<(), StageError> {
        let feeder = self
            .context
            .branch_feeder(branch)
            .ok_or_else(|| StageError::UnknownBranch(branch.to_string()))?;
        trace!(stage = %self.stage, branch = %branch, "Emitting item to branch");
        feeder.feed(item).await?;
        Ok(())
    }
}
