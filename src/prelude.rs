//! Commonly used types and traits

pub use crate::branch::{Branch, BranchName, Branches};
pub use crate::chain::Chain;
pub use crate::context::Context;
pub use crate::error::ChainError;
pub use crate::logger::{LoggerOpts, StepLogger, TracingLogger};
pub use crate::result::{StepError, StepResult, StepState};
pub use crate::step::{RetrySleep, Step, StepFn, StepName, StepOpts};
