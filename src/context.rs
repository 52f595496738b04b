//! Shared data bag and progress record for one chain run.

use crate::logger::{StepLogRecord, StepLogger, TracingLogger};
use crate::result::{StepData, StepResult};
use crate::step::StepName;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;

/// Type-safe context key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a new ContextKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ContextKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Execution context shared by every step of a chain run.
///
/// Holds the data written by steps, the latest [`StepResult`] per step name
/// and the [`StepLogger`] the engine reports to. Keys are only ever added or
/// overwritten, never removed, so later steps see everything earlier steps
/// produced. Build one context per logical run.
///
/// # Examples
///
/// ```
/// use stepchain::Context;
///
/// let mut ctx = Context::new();
/// ctx.insert("n1", 5);
/// ctx.insert("name", "Alice");
///
/// assert_eq!(ctx.get::<i64>("n1"), Some(5));
/// assert_eq!(ctx.get::<String>("name"), Some("Alice".to_string()));
///
/// // Wrong type returns None
/// assert_eq!(ctx.get::<bool>("n1"), None);
/// ```
pub struct Context {
    data: HashMap<ContextKey, Value>,
    progress: HashMap<StepName, StepResult>,
    current_step: Option<StepName>,
    logger: Arc<dyn StepLogger>,
    started_at: Instant,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .field("progress", &self.progress.keys().collect::<Vec<_>>())
            .field("current_step", &self.current_step)
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates an empty context with step logging disabled.
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger::default()))
    }

    /// Creates an empty context reporting to `logger`.
    pub fn with_logger(logger: Arc<dyn StepLogger>) -> Self {
        Self {
            data: HashMap::new(),
            progress: HashMap::new(),
            current_step: None,
            logger,
            started_at: Instant::now(),
        }
    }

    /// Replaces the logger.
    pub fn use_logger(&mut self, logger: Arc<dyn StepLogger>) -> &mut Self {
        self.logger = logger;
        self
    }

    /// Inserts a value with the given key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<ContextKey>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Returns the value for `key` decoded as `T`.
    ///
    /// Returns `None` if the key doesn't exist or the value doesn't decode.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns the raw value for `key`.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Merges `data` into the context, overwriting colliding keys.
    pub fn merge(&mut self, data: &StepData) {
        for (key, value) in data {
            self.data.insert(ContextKey::new(key.as_str()), value.clone());
        }
    }

    /// Returns `true` if the context contains a value for the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns an iterator over all keys in the context.
    pub fn keys(&self) -> impl Iterator<Item = &ContextKey> {
        self.data.keys()
    }

    /// Returns the data as a plain map, mostly for inspection and tests.
    pub fn data(&self) -> HashMap<String, Value> {
        self.data
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect()
    }

    /// Returns the number of entries in the context.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the context contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Records `result` as the latest outcome of `step`.
    pub fn set_progress(&mut self, step: StepName, result: StepResult) {
        self.progress.insert(step, result);
    }

    /// Returns the latest result recorded for `step`.
    pub fn progress(&self, step: &str) -> Option<&StepResult> {
        self.progress.get(step)
    }

    pub fn progress_entries(&self) -> impl Iterator<Item = (&StepName, &StepResult)> {
        self.progress.iter()
    }

    /// Name of the step being executed, or the last one executed.
    pub fn current_step(&self) -> Option<&StepName> {
        self.current_step.as_ref()
    }

    pub(crate) fn set_current_step(&mut self, step: StepName) {
        self.current_step = Some(step);
    }

    /// Logs a message at `INFO` through the context's logger.
    pub fn log(&self, message: &str) {
        self.logger.log(Level::INFO, message);
    }

    /// Logs a message at `level` through the context's logger.
    pub fn log_at(&self, level: Level, message: &str) {
        self.logger.log(level, message);
    }

    pub(crate) fn log_step(&self, record: &StepLogRecord) {
        self.logger.log_step(record);
    }

    /// Returns the time elapsed since the context was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::StepState;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        steps: Mutex<Vec<String>>,
        messages: Mutex<Vec<(Level, String)>>,
    }

    impl StepLogger for Recording {
        fn log_step(&self, record: &StepLogRecord) {
            self.steps
                .lock()
                .expect("lock")
                .push(record.step_name.to_string());
        }

        fn log(&self, level: Level, message: &str) {
            self.messages
                .lock()
                .expect("lock")
                .push((level, message.to_string()));
        }
    }

    #[test]
    fn test_heterogeneous_values() {
        let mut ctx = Context::new();

        ctx.insert("int", 42);
        ctx.insert("string", "hello");
        ctx.insert("bool", true);

        assert_eq!(ctx.get::<i32>("int"), Some(42));
        assert_eq!(ctx.get::<String>("string"), Some("hello".to_string()));
        assert_eq!(ctx.get::<bool>("bool"), Some(true));
        assert_eq!(ctx.get::<String>("int"), None);
        assert_eq!(ctx.get_value("int"), Some(&json!(42)));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_merge_overwrites_and_keeps() {
        let mut ctx = Context::new();
        ctx.insert("x", 1);
        ctx.insert("y", "kept");

        let mut data = StepData::new();
        data.insert("x".to_string(), json!(2));
        data.insert("z".to_string(), json!([1, 2]));
        ctx.merge(&data);

        assert_eq!(ctx.get::<i64>("x"), Some(2));
        assert_eq!(ctx.get::<String>("y"), Some("kept".to_string()));
        assert_eq!(ctx.get::<Vec<i64>>("z"), Some(vec![1, 2]));
    }

    #[test]
    fn test_progress_keeps_latest_result() {
        let mut ctx = Context::new();
        ctx.set_progress(StepName::new("fetch"), StepResult::pending());
        ctx.set_progress(StepName::new("fetch"), StepResult::complete());

        assert_eq!(
            ctx.progress("fetch").map(StepResult::state),
            Some(StepState::Complete)
        );
        assert_eq!(ctx.progress_entries().count(), 1);
        assert!(ctx.progress("missing").is_none());
    }

    #[test]
    fn test_log_forwards_to_logger() {
        let logger = Arc::new(Recording::default());
        let ctx = Context::with_logger(logger.clone());

        ctx.log("hello");
        ctx.log_at(Level::ERROR, "boom");

        let messages = logger.messages.lock().expect("lock");
        assert_eq!(
            *messages,
            vec![
                (Level::INFO, "hello".to_string()),
                (Level::ERROR, "boom".to_string())
            ]
        );
    }

    #[test]
    fn test_use_logger_replaces_sink() {
        let logger = Arc::new(Recording::default());
        let mut ctx = Context::new();
        ctx.use_logger(logger.clone());

        ctx.log_step(&StepLogRecord {
            step_name: StepName::new("notify"),
            state: StepState::Complete,
            message: None,
            error: None,
            run_count: 1,
            max_run_attempts: 1,
        });

        assert_eq!(*logger.steps.lock().expect("lock"), vec!["notify"]);
    }

    #[test]
    fn test_context_key() {
        let key1 = ContextKey::new("test");
        let key2: ContextKey = "test".into();
        assert_eq!(key1, key2);
    }
}
