//! Named sub-chains and the resolver that picks one of them.

use crate::context::Context;
use crate::error::ChainError;
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe branch name wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Selects the branch to enter after the owning step succeeded.
pub type ResolverFn = dyn Fn(&Context) -> BranchName + Send + Sync;

/// An alternate sub-chain, run with the same context as its parent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    branch_name: BranchName,
    steps: Vec<Step>,
}

impl Branch {
    pub fn new(name: impl Into<BranchName>, steps: Vec<Step>) -> Self {
        Self {
            branch_name: name.into(),
            steps,
        }
    }

    pub fn name(&self) -> &BranchName {
        &self.branch_name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut Vec<Step> {
        &mut self.steps
    }

    /// Renders this branch and everything below it as JSON.
    pub fn to_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Like [`Branch::to_json`], indented.
    pub fn to_json_pretty(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub(crate) fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
    }
}

/// The branches hanging off a step, plus the resolver choosing between them.
///
/// The resolver runs once, after the owning step finished with a complete or
/// skipped state, and sees the context including that step's output. The
/// first branch whose name equals the resolved name is entered. When no name
/// matches, nothing is entered and the parent chain simply moves on.
///
/// # Examples
///
/// ```
/// use stepchain::{Branch, Branches, Context, Step, StepResult};
///
/// let branches = Branches::new(|ctx: &Context| {
///     if ctx.get::<i64>("result").unwrap_or_default() % 2 == 0 {
///         "divide".into()
///     } else {
///         "multiply".into()
///     }
/// })
/// .branch(Branch::new("divide", vec![Step::new("halve", |ctx: &mut Context| {
///     let n = ctx.get::<i64>("result").unwrap_or_default();
///     StepResult::complete().with("result", n / 2)
/// })]))
/// .branch(Branch::new("multiply", vec![]));
///
/// let mut ctx = Context::new();
/// ctx.insert("result", 8);
/// assert_eq!(branches.resolve(&ctx).map(|b| b.name().as_str()), Some("divide"));
/// ```
#[derive(Serialize)]
pub struct Branches {
    #[serde(skip)]
    resolver: Box<ResolverFn>,
    branches: Vec<Branch>,
}

impl fmt::Debug for Branches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branches")
            .field("branches", &self.branches)
            .finish_non_exhaustive()
    }
}

impl Branches {
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&Context) -> BranchName + Send + Sync + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            branches: Vec::new(),
        }
    }

    /// Appends a branch. Order matters when names repeat: the first wins.
    pub fn branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Runs the resolver against `ctx` and returns the name it picked.
    pub fn resolve_name(&self, ctx: &Context) -> BranchName {
        (self.resolver)(ctx)
    }

    /// Returns the branch the resolver picks for `ctx`, if one matches.
    pub fn resolve(&self, ctx: &Context) -> Option<&Branch> {
        let name = self.resolve_name(ctx);
        self.branches.iter().find(|b| b.branch_name == name)
    }

    pub(crate) fn resolve_mut(&mut self, ctx: &Context) -> (BranchName, Option<&mut Branch>) {
        let name = self.resolve_name(ctx);
        let branch = self.branches.iter_mut().find(|b| b.branch_name == name);
        (name, branch)
    }

    pub(crate) fn reset(&mut self) {
        for branch in &mut self.branches {
            branch.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::StepResult;
    use serde_json::json;

    fn by_key(key: &'static str) -> Branches {
        Branches::new(move |ctx: &Context| {
            BranchName::new(ctx.get::<String>(key).unwrap_or_default())
        })
    }

    #[test]
    fn test_resolve_first_match() {
        let branches = by_key("route")
            .branch(Branch::new("a", vec![Step::noop("first")]))
            .branch(Branch::new("a", vec![Step::noop("second")]))
            .branch(Branch::new("b", vec![]));

        let mut ctx = Context::new();
        ctx.insert("route", "a");

        let branch = branches.resolve(&ctx).expect("branch a");
        assert_eq!(branch.steps()[0].name().as_str(), "first");
    }

    #[test]
    fn test_resolve_miss() {
        let branches = by_key("route").branch(Branch::new("a", vec![]));

        let mut ctx = Context::new();
        ctx.insert("route", "z");

        assert!(branches.resolve(&ctx).is_none());
        assert_eq!(branches.resolve_name(&ctx).as_str(), "z");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let branches = by_key("route")
            .branch(Branch::new("a", vec![]))
            .branch(Branch::new("b", vec![]));

        let mut ctx = Context::new();
        ctx.insert("route", "b");

        for _ in 0..5 {
            assert_eq!(
                branches.resolve(&ctx).map(|b| b.name().as_str()),
                Some("b")
            );
        }
    }

    #[test]
    fn test_branch_to_json() {
        let branch = Branch::new(
            "root",
            vec![Step::new("check", |_ctx: &mut Context| StepResult::complete())
                .with_branches(by_key("route").branch(Branch::new("left", vec![Step::noop("l1")])))],
        );

        let value: serde_json::Value =
            serde_json::from_str(&branch.to_json().expect("json")).expect("valid json");
        assert_eq!(value["branchName"], json!("root"));
        assert_eq!(value["steps"][0]["name"], json!("check"));
        assert_eq!(
            value["steps"][0]["branches"]["branches"][0]["branchName"],
            json!("left")
        );
        assert!(value["steps"][0]["branches"].get("resolver").is_none());
    }
}
