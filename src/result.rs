//! Step outcomes and the retry-matchable error payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Key/value pairs a step hands back to be merged into the context.
pub type StepData = HashMap<String, Value>;

/// State of a step after one execution.
///
/// `Pending` and `Error` are retriable, the other states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// The step finished successfully.
    Complete,
    /// The step failed without an error payload. Never retried.
    Failed,
    /// The step decided it had nothing to do.
    Skipped,
    /// The step is not done yet and should be tried again.
    Pending,
    /// The step failed with a [`StepError`].
    Error,
}

impl StepState {
    /// Returns `true` for states that may be re-executed under a retry policy.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StepState::Pending | StepState::Error)
    }

    /// Returns `true` for states that let the chain move on.
    pub fn is_success(&self) -> bool {
        matches!(self, StepState::Complete | StepState::Skipped)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Complete => "complete",
            StepState::Failed => "failed",
            StepState::Skipped => "skipped",
            StepState::Pending => "pending",
            StepState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Error payload carried by a [`StepState::Error`] result.
///
/// Two errors are equal only when both the name and the message match,
/// which is what retry allow-lists compare against.
///
/// # Examples
///
/// ```
/// use stepchain::StepError;
///
/// let err = StepError::new("timeout", "upstream took too long");
/// assert_eq!(err.to_string(), "[timeout] upstream took too long");
/// assert_ne!(err, StepError::new("timeout", "upstream"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[error("[{name}] {message}")]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    name: String,
    message: String,
}

impl StepError {
    /// Name used by [`StepError::wrap`] for foreign errors.
    pub const WRAPPED_NAME: &'static str = "error";

    /// Creates a new error from an identifier and a human readable message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wraps any error, keeping its `Display` output as the message.
    pub fn wrap<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(Self::WRAPPED_NAME, err.to_string())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Output of a single step execution.
///
/// Built fluently from one of the state constructors. The error payload can
/// only be attached through [`StepResult::error`] or
/// [`StepResult::wrapped_error`], so it is present exactly when the state is
/// [`StepState::Error`].
///
/// # Examples
///
/// ```
/// use stepchain::{StepResult, StepState};
///
/// let result = StepResult::complete()
///     .with("total", 42)
///     .with_message("summed inputs");
///
/// assert_eq!(result.state(), StepState::Complete);
/// assert_eq!(result.data().get("total"), Some(&serde_json::json!(42)));
/// assert_eq!(result.message(), Some("summed inputs"));
/// assert!(result.step_error().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    state: StepState,
    #[serde(default)]
    data: StepData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing)]
    error: Option<StepError>,
}

impl StepResult {
    fn with_state(state: StepState) -> Self {
        Self {
            state,
            data: StepData::new(),
            message: None,
            error: None,
        }
    }

    pub fn complete() -> Self {
        Self::with_state(StepState::Complete)
    }

    pub fn failed() -> Self {
        Self::with_state(StepState::Failed)
    }

    pub fn skipped() -> Self {
        Self::with_state(StepState::Skipped)
    }

    pub fn pending() -> Self {
        Self::with_state(StepState::Pending)
    }

    /// Creates an `Error` result carrying `error`.
    pub fn error(error: StepError) -> Self {
        Self {
            error: Some(error),
            ..Self::with_state(StepState::Error)
        }
    }

    /// Creates an `Error` result from a foreign error, see [`StepError::wrap`].
    pub fn wrapped_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::error(StepError::wrap(err))
    }

    /// Replaces the data to merge into the context.
    pub fn with_data(mut self, data: StepData) -> Self {
        self.data = data;
        self
    }

    /// Adds a single key to the data to merge into the context.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn data(&self) -> &StepData {
        &self.data
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn step_error(&self) -> Option<&StepError> {
        self.error.as_ref()
    }
}
