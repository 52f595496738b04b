use crate::result::{StepError, StepState};
use crate::step::StepName;
use thiserror::Error;

/// Errors surfaced by the chain engine.
///
/// Retriable step outcomes never show up here: they are absorbed by the
/// per-step retry loop. Only a chain that stops early, an invalid retry
/// configuration or a failed tree dump produce a `ChainError`.
///
/// # Non-Exhaustive
///
/// New variants may be added, so always keep a wildcard arm:
///
/// ```
/// use stepchain::ChainError;
///
/// fn report(error: ChainError) {
///     match error {
///         ChainError::Aborted { step_name, state, .. } => {
///             eprintln!("chain stopped at {} ({})", step_name, state);
///         }
///         other => eprintln!("chain error: {}", other),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChainError {
    /// A step ended in a state other than complete or skipped once its
    /// retry attempts were used up, so the chain walk stopped.
    ///
    /// The full result of that step stays available through
    /// [`Context::progress`](crate::Context::progress).
    #[error("Chain aborted at step '{step_name}' with state {state}")]
    Aborted {
        /// The step that stopped the chain.
        step_name: StepName,
        /// The state of its last attempt.
        state: StepState,
        /// The error payload of its last attempt, if any.
        error: Option<StepError>,
    },

    /// A retry sleep configuration was rejected.
    #[error("Invalid retry sleep: {0}")]
    InvalidRetrySleep(&'static str),

    /// The step tree could not be rendered as JSON.
    #[error("Failed to serialize step tree: {0}")]
    Serialization(#[from] serde_json::Error),
}
