//! Arithmetic chain: add, subtract with retries, branch on parity, print.
//!
//! Run with `cargo run --example arithmetic_chain`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stepchain::prelude::*;

fn int(ctx: &Context, key: &str) -> i64 {
    ctx.get::<i64>(key).unwrap_or_default()
}

fn branching_step() -> Step {
    Step::new("multiplyDivide", |ctx: &mut Context| {
        StepResult::complete().with("result", int(ctx, "result") * 2)
    })
    .with_branches(
        Branches::new(|ctx: &Context| {
            if int(ctx, "result") % 2 == 0 {
                BranchName::new("divide")
            } else {
                BranchName::new("multiply")
            }
        })
        .branch(Branch::new(
            "divide",
            vec![Step::new("step3.divide", |ctx: &mut Context| {
                ctx.log_at(tracing::Level::WARN, "halving the result");
                StepResult::complete().with("result", int(ctx, "result") / 2)
            })],
        ))
        .branch(Branch::new(
            "multiply",
            vec![Step::new("step3.multiply", |ctx: &mut Context| {
                StepResult::complete().with("result", int(ctx, "result") * 2)
            })],
        )),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let attempts = Arc::new(AtomicU32::new(0));
    let transient = StepError::new("transient", "backend busy");
    let raised = transient.clone();

    let mut chain = Chain::new(vec![
        Step::new("add", |ctx: &mut Context| {
            ctx.log("adding n1 and n2");
            StepResult::complete().with("result", int(ctx, "n1") + int(ctx, "n2"))
        })
        .with_arg("n1", 5)
        .with_arg("n2", 4),
        Step::new("subtract", move |ctx: &mut Context| {
            match attempts.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => StepResult::pending().with_message("waiting for backend"),
                2 | 3 => StepResult::error(raised.clone()),
                _ => StepResult::complete().with("result", int(ctx, "n1") - int(ctx, "result")),
            }
        })
        .with_arg("n1", 5)
        .with_opts(
            StepOpts::new()
                .max_run_attempts(5)
                .retry_on(transient)
                .retry_sleep(RetrySleep::exponential(
                    Duration::from_millis(50),
                    Duration::from_millis(400),
                    2,
                )?),
        ),
        branching_step(),
        Step::new("addFive", |ctx: &mut Context| {
            StepResult::complete().with("result", int(ctx, "result") + 5)
        }),
        Step::new("print", |ctx: &mut Context| {
            ctx.log(&format!("result {}", int(ctx, "result")));
            StepResult::complete()
        }),
    ]);

    println!("Step tree:\n{}", chain.to_json_pretty()?);

    let mut ctx = Context::with_logger(Arc::new(TracingLogger::enabled()));
    match chain.execute(&mut ctx).await {
        Ok(()) => println!("Chain completed, result = {}", int(&ctx, "result")),
        Err(e) => eprintln!("Chain failed: {}", e),
    }

    Ok(())
}
