//! # stepchain
//!
//! A small engine running an ordered list of named steps against one shared,
//! mutable [`Context`], with per-step retries and conditional branches.
//!
//! ## Features
//!
//! - **Sequential**: steps run one after another; a step's output data is
//!   merged into the context before the next step starts
//! - **Retry Support**: per-step attempt budgets, exact-match error allow-lists,
//!   fixed or exponential sleep between attempts
//! - **Branching**: a step can route into one of several named sub-chains,
//!   chosen from the context it just produced
//! - **Structured Logging**: one record per execution through a pluggable
//!   [`StepLogger`], backed by `tracing` by default
//! - **Inspectable**: the step tree renders to JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use stepchain::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut chain = Chain::new(vec![
//!     Step::new("add", |ctx: &mut Context| {
//!         let n1 = ctx.get::<i64>("n1").unwrap_or_default();
//!         let n2 = ctx.get::<i64>("n2").unwrap_or_default();
//!         StepResult::complete().with("result", n1 + n2)
//!     })
//!     .with_arg("n1", 5)
//!     .with_arg("n2", 4),
//!     Step::new("subtract", |ctx: &mut Context| {
//!         let n1 = ctx.get::<i64>("n1").unwrap_or_default();
//!         let result = ctx.get::<i64>("result").unwrap_or_default();
//!         StepResult::complete().with("result", n1 - result)
//!     })
//!     .with_arg("n1", 5),
//! ]);
//!
//! let mut ctx = Context::new();
//! chain.execute(&mut ctx).await.expect("chain failed");
//!
//! assert_eq!(ctx.get::<i64>("result"), Some(-4));
//! # }
//! ```
//!
//! ## Retries
//!
//! A step returning [`StepState::Pending`] or [`StepState::Error`] is run
//! again, in place and with the same context, while its [`StepOpts`] allow it:
//!
//! ```rust
//! use stepchain::prelude::*;
//! use std::time::Duration;
//!
//! let opts = StepOpts::new()
//!     .max_run_attempts(5)
//!     .retry_on(StepError::new("db", "deadlock"))
//!     .retry_sleep(RetrySleep::Fixed(Duration::from_millis(200)));
//! ```
//!
//! Once retrying stops, a step that is not complete or skipped aborts the
//! whole chain with [`ChainError::Aborted`].
//!
//! ## Branches
//!
//! ```rust
//! use stepchain::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let route = Branches::new(|ctx: &Context| {
//!     if ctx.get::<i64>("result").unwrap_or_default() % 2 == 0 {
//!         BranchName::new("even")
//!     } else {
//!         BranchName::new("odd")
//!     }
//! })
//! .branch(Branch::new("even", vec![Step::new("tag_even", |_ctx: &mut Context| {
//!     StepResult::complete().with("parity", "even")
//! })]))
//! .branch(Branch::new("odd", vec![Step::new("tag_odd", |_ctx: &mut Context| {
//!     StepResult::complete().with("parity", "odd")
//! })]));
//!
//! let mut chain = Chain::new(vec![
//!     Step::new("seed", |_ctx: &mut Context| StepResult::complete().with("result", 7))
//!         .with_branches(route),
//! ]);
//!
//! let mut ctx = Context::new();
//! chain.execute(&mut ctx).await.expect("chain failed");
//! assert_eq!(ctx.get::<String>("parity"), Some("odd".to_string()));
//! # }
//! ```
//!
//! A resolver naming a branch that doesn't exist enters nothing; the chain
//! continues with the next sibling step.

mod branch;
mod chain;
mod context;
mod error;
mod logger;
mod result;
mod step;

pub mod prelude;

pub use branch::{Branch, BranchName, Branches, ResolverFn};
pub use chain::Chain;
pub use context::{Context, ContextKey};
pub use error::ChainError;
pub use logger::{LoggerOpts, StepLogRecord, StepLogger, TracingLogger};
pub use result::{StepData, StepError, StepResult, StepState};
pub use step::{RetrySleep, Step, StepFn, StepName, StepOpts, DEFAULT_MAX_RUN_ATTEMPTS};
