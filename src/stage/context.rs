//! Stage context: what a pipeline shares with each of its stages.
//!
//! The context resolves channels between stages, exposes shared environment
//! values and fans events out to registered listeners. How a pipeline builds
//! its context is up to the assembly layer; [`InMemoryContext`] is a plain
//! map-backed implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::SharedFeeder;

/// An event raised by a stage and delivered to every registered listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageEvent {
    /// Name of the stage that raised the event.
    pub source: String,
    /// Event name, free-form.
    pub name: String,
    /// Arbitrary event data.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub raised_at: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            payload: serde_json::Value::Null,
            raised_at: Utc::now(),
        }
    }

    /// Sets the event payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Receives events raised through a [`StageContext`].
pub trait StageEventListener: Send + Sync {
    fn notify(&self, event: &StageEvent);
}

/// Capabilities a stage and its driver consume from the pipeline.
pub trait StageContext<T: Send + 'static>: Send + Sync {
    /// Feeder of the driver downstream of `stage`, if any.
    fn downstream_feeder(&self, stage: &str) -> Option<SharedFeeder<T>>;

    /// Feeder of the first stage on `branch`, if the branch exists.
    fn branch_feeder(&self, branch: &str) -> Option<SharedFeeder<T>>;

    /// Shared environment value.
    fn env(&self, key: &str) -> Option<serde_json::Value>;

    fn register_listener(&self, listener: Arc<dyn StageEventListener>);

    fn listeners(&self) -> Vec<Arc<dyn StageEventListener>>;

    /// Notifies every registered listener.
    fn raise(&self, event: StageEvent);
}

/// Map-backed [`StageContext`].
///
/// Routes can be set up front with the `with_*` builders, or wired later with
/// [`connect_downstream`](Self::connect_downstream) and
/// [`connect_branch`](Self::connect_branch) once the drivers exist.
pub struct InMemoryContext<T: Send + 'static> {
    env: HashMap<String, serde_json::Value>,
    downstream: RwLock<HashMap<String, SharedFeeder<T>>>,
    branches: RwLock<HashMap<String, SharedFeeder<T>>>,
    listeners: RwLock<Vec<Arc<dyn StageEventListener>>>,
}

impl<T: Send + 'static> Default for InMemoryContext<T> {
    fn default() -> Self {
        Self {
            env: HashMap::new(),
            downstream: RwLock::new(HashMap::new()),
            branches: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Send + 'static> InMemoryContext<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a shared environment value.
    pub fn with_env(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.env.insert(key.into(), value);
        self
    }

    /// Routes the output of `stage` into `feeder`.
    pub fn with_downstream(self, stage: impl Into<String>, feeder: SharedFeeder<T>) -> Self {
        self.connect_downstream(stage, feeder);
        self
    }

    /// Registers `feeder` as the entry of `branch`.
    pub fn with_branch(self, branch: impl Into<String>, feeder: SharedFeeder<T>) -> Self {
        self.connect_branch(branch, feeder);
        self
    }

    /// Routes the output of `stage` into `feeder`, replacing any previous route.
    pub fn connect_downstream(&self, stage: impl Into<String>, feeder: SharedFeeder<T>) {
        let stage = stage.into();
        debug!(stage = %stage, "Connecting downstream feeder");
        self.downstream
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stage, feeder);
    }

    /// Registers `feeder` as the entry of `branch`, replacing any previous one.
    pub fn connect_branch(&self, branch: impl Into<String>, feeder: SharedFeeder<T>) {
        let branch = branch.into();
        debug!(branch = %branch, "Connecting branch feeder");
        self.branches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(branch, feeder);
    }
}

impl<T: Send + 'static> StageContext<T> for InMemoryContext<T> {
    fn downstream_feeder(&self, stage: &str) -> Option<SharedFeeder<T>> {
        self.downstream
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(stage)
            .cloned()
    }

    fn branch_feeder(&self, branch: &str) -> Option<SharedFeeder<T>> {
        self.branches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(branch)
            .cloned()
    }

    fn env(&self, key: &str) -> Option<serde_json::Value> {
        self.env.get(key).cloned()
    }

    fn register_listener(&self, listener: Arc<dyn StageEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn listeners(&self) -> Vec<Arc<dyn StageEventListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn raise(&self, event: StageEvent) {
        // Snapshot first so a listener may register another listener.
        let listeners = self.listeners();
        debug!(
            source = %event.source,
            event = %event.name,
            listeners = listeners.len(),
            "Raising stage event"
        );
        for listener in listeners {
            listener.notify(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl StageEventListener for Recorder {
        fn notify(&self, event: &StageEvent) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", self.tag, event.source, event.name));
        }
    }

    #[test]
    fn test_env_lookup() {
        let context = InMemoryContext::<u32>::new()
            .with_env("batch_size", serde_json::json!(32))
            .with_env("region", serde_json::json!("eu-west"));

        assert_eq!(context.env("batch_size"), Some(serde_json::json!(32)));
        assert_eq!(context.env("region"), Some(serde_json::json!("eu-west")));
        assert_eq!(context.env("missing"), None);
    }

    #[test]
    fn test_missing_routes_resolve_to_none() {
        let context = InMemoryContext::<u32>::new();
        assert!(context.downstream_feeder("parse").is_none());
        assert!(context.branch_feeder("audit").is_none());
    }

    #[test]
    fn test_raise_notifies_listeners_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let context = InMemoryContext::<u32>::new();
        context.register_listener(Arc::new(Recorder {
            tag: "first",
            seen: Arc::clone(&seen),
        }));
        context.register_listener(Arc::new(Recorder {
            tag: "second",
            seen: Arc::clone(&seen),
        }));
        assert_eq!(context.listeners().len(), 2);

        context.raise(StageEvent::new("parse", "batch_done").with_payload(serde_json::json!(3)));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                "first:parse:batch_done".to_string(),
                "second:parse:batch_done".to_string()
            ]
        );
    }

    #[test]
    fn test_stage_event_serialization() {
        let event = StageEvent::new("load", "flushed").with_payload(serde_json::json!({"rows": 10}));
        let json = serde_json::to_string(&event).unwrap();
        let back: StageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
