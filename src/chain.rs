//! Chain executor: walks steps in order, retries in place, enters branches.

use crate::branch::Branch;
use crate::context::Context;
use crate::error::ChainError;
use crate::result::{StepResult, StepState};
use crate::step::Step;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChainError>> + Send + 'a>>;

/// An ordered sequence of steps, executed top to bottom.
///
/// The chain owns its step tree. Topology is fixed once built; executing it
/// only updates each step's run count and last result.
///
/// # Examples
///
/// ```
/// use stepchain::{Chain, Context, Step, StepResult};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), stepchain::ChainError> {
/// let mut chain = Chain::new(vec![
///     Step::new("load", |_ctx: &mut Context| StepResult::complete().with("rows", 3)),
///     Step::new("double", |ctx: &mut Context| {
///         let rows = ctx.get::<i64>("rows").unwrap_or_default();
///         StepResult::complete().with("rows", rows * 2)
///     }),
/// ]);
///
/// let mut ctx = Context::new();
/// chain.execute(&mut ctx).await?;
/// assert_eq!(ctx.get::<i64>("rows"), Some(6));
/// # Ok(())
/// # }
/// ```
pub struct Chain {
    root: Branch,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("root", &self.root).finish()
    }
}

impl Chain {
    /// Name of the implicit branch holding the top-level steps.
    pub const ROOT: &'static str = "root";

    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            root: Branch::new(Self::ROOT, steps),
        }
    }

    pub fn root(&self) -> &Branch {
        &self.root
    }

    pub fn steps(&self) -> &[Step] {
        self.root.steps()
    }

    /// Walks the chain against `ctx`.
    ///
    /// Run counts and last results of every step in the tree are cleared
    /// first, so executing the same chain twice behaves the same. Data already
    /// in `ctx` is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Aborted`] when a step ends in a failed, pending or
    /// error state after its retries. Context writes made before that point
    /// are not rolled back.
    pub async fn execute(&mut self, ctx: &mut Context) -> Result<(), ChainError> {
        self.root.reset();
        let outcome = run_steps(self.root.steps_mut(), ctx).await;
        match &outcome {
            Ok(()) => info!("Chain completed in {:?}", ctx.elapsed()),
            Err(e) => warn!("Chain stopped: {}", e),
        }
        outcome
    }

    /// Renders the step tree as JSON, leaving out functions and resolvers.
    pub fn to_json(&self) -> Result<String, ChainError> {
        self.root.to_json()
    }

    pub fn to_json_pretty(&self) -> Result<String, ChainError> {
        self.root.to_json_pretty()
    }
}

fn run_steps<'a>(steps: &'a mut [Step], ctx: &'a mut Context) -> WalkFuture<'a> {
    Box::pin(async move {
        for step in steps.iter_mut() {
            run_with_retry(step, ctx).await?;

            let step_name = step.name().clone();
            let Some(branches) = step.branches_mut() else {
                continue;
            };

            match branches.resolve_mut(ctx) {
                (name, Some(branch)) => {
                    debug!("Step '{}' entering branch '{}'", step_name, name);
                    run_steps(branch.steps_mut(), ctx).await?;
                }
                (name, None) => {
                    debug!(
                        "Step '{}' resolved to unknown branch '{}', continuing",
                        step_name, name
                    );
                }
            }
        }
        Ok(())
    })
}

async fn run_with_retry(step: &mut Step, ctx: &mut Context) -> Result<(), ChainError> {
    step.execute(ctx).await;

    while step.should_retry() {
        let state = step.last_result().map(StepResult::state);
        info!(
            "Step '{}' {}, retrying ({}/{})",
            step.name(),
            state.map(|s| s.to_string()).unwrap_or_default(),
            step.run_count() + 1,
            step.opts().effective_max_run_attempts()
        );
        if let Some(delay) = step.next_retry_delay() {
            tokio::time::sleep(delay).await;
        }
        step.execute(ctx).await;
    }

    if step.should_exit() {
        let result = step.last_result();
        let state = result.map_or(StepState::Failed, StepResult::state);
        warn!(
            "Step '{}' ended in state {} after {} run(s)",
            step.name(),
            state,
            step.run_count()
        );
        return Err(ChainError::Aborted {
            step_name: step.name().clone(),
            state,
            error: result.and_then(|r| r.step_error().cloned()),
        });
    }

    Ok(())
}
