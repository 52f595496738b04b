use crate::branch::Branches;
use crate::context::Context;
use crate::error::ChainError;
use crate::logger::StepLogRecord;
use crate::result::{StepError, StepResult, StepState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Attempts a step gets when none are configured: run once, no retry.
pub const DEFAULT_MAX_RUN_ATTEMPTS: u32 = 1;

/// Type-safe step name wrapper.
///
/// Names are used for progress lookup in the [`Context`]. They need not be
/// globally unique.
///
/// # Examples
///
/// ```
/// use stepchain::StepName;
///
/// let name = StepName::new("validate");
/// assert_eq!(name.as_str(), "validate");
///
/// let name: StepName = "persist".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Delay inserted before each retry attempt.
///
/// # Examples
///
/// ```
/// use stepchain::RetrySleep;
/// use std::time::Duration;
///
/// // No delay (default)
/// assert_eq!(RetrySleep::default().delay_for_retry(0), None);
///
/// // Fixed: 1 second before every retry
/// let sleep = RetrySleep::Fixed(Duration::from_secs(1));
/// assert_eq!(sleep.delay_for_retry(3), Some(Duration::from_secs(1)));
///
/// // Exponential: 100ms, 200ms, 400ms, ...
/// let sleep = RetrySleep::exponential(Duration::from_millis(100), Duration::from_secs(5), 2)?;
/// assert_eq!(sleep.delay_for_retry(2), Some(Duration::from_millis(400)));
/// # Ok::<(), stepchain::ChainError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetrySleep {
    /// Retry immediately.
    #[default]
    None,
    /// Same delay before every retry.
    Fixed(Duration),
    /// Delay multiplied after each retry, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Upper bound for any delay.
        max: Duration,
        /// Factor applied per retry.
        multiplier: u32,
    },
}

impl RetrySleep {
    /// Creates an exponential sleep.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidRetrySleep`] if `multiplier` is 0 or
    /// above 10, or if `max` is below `initial`.
    pub fn exponential(initial: Duration, max: Duration, multiplier: u32) -> Result<Self, ChainError> {
        if multiplier == 0 {
            return Err(ChainError::InvalidRetrySleep(
                "multiplier must be greater than 0",
            ));
        }
        if multiplier > 10 {
            return Err(ChainError::InvalidRetrySleep(
                "multiplier must be 10 or less to avoid overflow",
            ));
        }
        if max < initial {
            return Err(ChainError::InvalidRetrySleep("max must be >= initial"));
        }
        Ok(RetrySleep::Exponential {
            initial,
            max,
            multiplier,
        })
    }

    /// Delay before the `retry`-th retry (0-based). `None` means no sleep.
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        let delay = match self {
            RetrySleep::None => return None,
            RetrySleep::Fixed(delay) => *delay,
            RetrySleep::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.saturating_pow(retry);
                initial.saturating_mul(factor).min(*max)
            }
        };
        (!delay.is_zero()).then_some(delay)
    }
}

/// Retry configuration of a step.
///
/// # Examples
///
/// ```
/// use stepchain::{StepError, StepOpts, RetrySleep};
/// use std::time::Duration;
///
/// let opts = StepOpts::new()
///     .max_run_attempts(5)
///     .retry_on(StepError::new("net", "connection reset"))
///     .retry_sleep(RetrySleep::Fixed(Duration::from_millis(50)));
///
/// assert_eq!(opts.max_run_attempts, 5);
/// assert!(!opts.retry_all_errors);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOpts {
    /// Total runs allowed, first run included. 0 behaves as 1.
    pub max_run_attempts: u32,
    /// Retry every `Error` result, ignoring `errors_to_retry`.
    pub retry_all_errors: bool,
    /// Errors retried on exact match.
    pub errors_to_retry: Vec<StepError>,
    /// Delay before each retry.
    pub retry_sleep: RetrySleep,
}

impl Default for StepOpts {
    fn default() -> Self {
        Self {
            max_run_attempts: DEFAULT_MAX_RUN_ATTEMPTS,
            retry_all_errors: false,
            errors_to_retry: Vec::new(),
            retry_sleep: RetrySleep::None,
        }
    }
}

impl StepOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_run_attempts(mut self, attempts: u32) -> Self {
        self.max_run_attempts = attempts;
        self
    }

    pub fn retry_all_errors(mut self, retry: bool) -> Self {
        self.retry_all_errors = retry;
        self
    }

    /// Adds `error` to the retry allow-list.
    pub fn retry_on(mut self, error: StepError) -> Self {
        if !self.errors_to_retry.contains(&error) {
            self.errors_to_retry.push(error);
        }
        self
    }

    pub fn retry_sleep(mut self, sleep: RetrySleep) -> Self {
        self.retry_sleep = sleep;
        self
    }

    /// Attempt budget with the "0 means once" rule applied.
    pub fn effective_max_run_attempts(&self) -> u32 {
        self.max_run_attempts.max(1)
    }
}

/// The unit of work a [`Step`] runs.
///
/// Implement this trait for handlers that need to await; plain closures are
/// accepted directly by [`Step::new`].
///
/// # Examples
///
/// ```
/// use stepchain::{Context, StepFn, StepResult};
/// use async_trait::async_trait;
///
/// struct Notify;
///
/// #[async_trait]
/// impl StepFn for Notify {
///     async fn run(&self, ctx: &mut Context) -> StepResult {
///         ctx.insert("notified", true);
///         StepResult::complete()
///     }
/// }
/// ```
#[async_trait]
pub trait StepFn: Send + Sync {
    /// Runs the work once against the shared context.
    async fn run(&self, ctx: &mut Context) -> StepResult;
}

struct FnStep<F>(F);

#[async_trait]
impl<F> StepFn for FnStep<F>
where
    F: Fn(&mut Context) -> StepResult + Send + Sync,
{
    async fn run(&self, ctx: &mut Context) -> StepResult {
        (self.0)(ctx)
    }
}

/// A named unit of work with retry options and optional branches.
///
/// Besides its configuration a step carries run-time progress: how many times
/// it ran and its last result. Both are reset by
/// [`Chain::execute`](crate::Chain::execute) before a walk starts and only
/// grow during it.
///
/// # Examples
///
/// ```
/// use stepchain::{Context, Step, StepResult, StepState};
///
/// # tokio_test::block_on(async {
/// let mut add = Step::new("add", |ctx: &mut Context| {
///     let n1 = ctx.get::<i64>("n1").unwrap_or_default();
///     let n2 = ctx.get::<i64>("n2").unwrap_or_default();
///     StepResult::complete().with("result", n1 + n2)
/// })
/// .with_arg("n1", 5)
/// .with_arg("n2", 4);
///
/// let mut ctx = Context::new();
/// add.execute(&mut ctx).await;
///
/// assert_eq!(ctx.get::<i64>("result"), Some(9));
/// assert_eq!(add.run_count(), 1);
/// assert_eq!(add.last_result().map(|r| r.state()), Some(StepState::Complete));
/// # });
/// ```
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    name: StepName,
    #[serde(skip)]
    function: Option<Box<dyn StepFn>>,
    step_args: HashMap<String, Value>,
    #[serde(rename = "stepConfig")]
    opts: StepOpts,
    #[serde(skip_serializing_if = "Option::is_none")]
    branches: Option<Branches>,
    run_count: u32,
    #[serde(rename = "stepResult")]
    last_result: Option<StepResult>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("has_function", &self.function.is_some())
            .field("step_args", &self.step_args)
            .field("opts", &self.opts)
            .field("branches", &self.branches)
            .field("run_count", &self.run_count)
            .field("last_result", &self.last_result)
            .finish()
    }
}

impl Step {
    /// Creates a step running the closure `f`.
    pub fn new<F>(name: impl Into<StepName>, f: F) -> Self
    where
        F: Fn(&mut Context) -> StepResult + Send + Sync + 'static,
    {
        Self::with_handler(name, FnStep(f))
    }

    /// Creates a step running a [`StepFn`] implementation.
    pub fn with_handler(name: impl Into<StepName>, handler: impl StepFn + 'static) -> Self {
        Self {
            function: Some(Box::new(handler)),
            ..Self::noop(name)
        }
    }

    /// Creates a step with no function. Executing it changes nothing, which
    /// makes it usable as a pure branching point.
    pub fn noop(name: impl Into<StepName>) -> Self {
        Self {
            name: name.into(),
            function: None,
            step_args: HashMap::new(),
            opts: StepOpts::default(),
            branches: None,
            run_count: 0,
            last_result: None,
        }
    }

    /// Adds an argument merged into the context before the function runs.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.step_args.insert(key.into(), value.into());
        self
    }

    pub fn with_opts(mut self, opts: StepOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_branches(mut self, branches: Branches) -> Self {
        self.branches = Some(branches);
        self
    }

    pub fn name(&self) -> &StepName {
        &self.name
    }

    pub fn opts(&self) -> &StepOpts {
        &self.opts
    }

    pub fn step_args(&self) -> &HashMap<String, Value> {
        &self.step_args
    }

    pub fn branches(&self) -> Option<&Branches> {
        self.branches.as_ref()
    }

    pub(crate) fn branches_mut(&mut self) -> Option<&mut Branches> {
        self.branches.as_mut()
    }

    pub fn has_function(&self) -> bool {
        self.function.is_some()
    }

    /// Number of times the function ran since the last reset.
    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    pub fn last_result(&self) -> Option<&StepResult> {
        self.last_result.as_ref()
    }

    /// Runs the function exactly once.
    ///
    /// Step arguments are merged into the context before the first call only,
    /// so writes made by earlier attempts survive a retry. Result data is
    /// merged after every call; the result is recorded as progress, the run
    /// counter is bumped and one record goes to the context's logger. A step
    /// without a function returns without touching anything.
    pub async fn execute(&mut self, ctx: &mut Context) {
        let Some(function) = &self.function else {
            return;
        };

        ctx.set_current_step(self.name.clone());
        if self.run_count == 0 {
            ctx.merge(&self.step_args);
        }

        let result = function.run(ctx).await;

        ctx.merge(result.data());
        ctx.set_progress(self.name.clone(), result.clone());
        self.run_count = self.run_count.saturating_add(1);

        ctx.log_step(&StepLogRecord {
            step_name: self.name.clone(),
            state: result.state(),
            message: result.message().map(str::to_string),
            error: result.step_error().cloned(),
            run_count: self.run_count,
            max_run_attempts: self.opts.effective_max_run_attempts(),
        });

        self.last_result = Some(result);
    }

    /// Decides whether the last run should be repeated.
    pub fn should_retry(&self) -> bool {
        if self.run_count >= self.opts.effective_max_run_attempts() {
            return false;
        }

        let Some(result) = &self.last_result else {
            return false;
        };

        match result.state() {
            StepState::Pending => true,
            StepState::Error if self.opts.retry_all_errors => true,
            StepState::Error => result
                .step_error()
                .is_some_and(|err| self.opts.errors_to_retry.contains(err)),
            StepState::Complete | StepState::Failed | StepState::Skipped => false,
        }
    }

    /// Decides, once retrying is over, whether the chain must stop here.
    ///
    /// A step that never produced a result (no function) does not stop it.
    pub fn should_exit(&self) -> bool {
        self.last_result
            .as_ref()
            .is_some_and(|result| !result.state().is_success())
    }

    /// Sleep to apply before the next retry, based on retries done so far.
    pub(crate) fn next_retry_delay(&self) -> Option<Duration> {
        let retries_done = self.run_count.saturating_sub(1);
        self.opts.retry_sleep.delay_for_retry(retries_done)
    }

    /// Clears run-time progress here and in every nested branch.
    pub(crate) fn reset(&mut self) {
        self.run_count = 0;
        self.last_result = None;
        if let Some(branches) = &mut self.branches {
            branches.reset();
        }
    }
}
