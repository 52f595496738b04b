//! Order processing: validate, reserve stock, charge, then ship or hold
//! depending on the payment method.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stepchain::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    id: String,
    items: Vec<OrderItem>,
    total_amount: f64,
    payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderItem {
    product_id: String,
    quantity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PaymentMethod {
    CreditCard,
    BankTransfer,
}

fn load_order(ctx: &Context) -> Option<Order> {
    ctx.get::<Order>("order")
}

fn validate(ctx: &mut Context) -> StepResult {
    let Some(order) = load_order(ctx) else {
        return StepResult::failed().with_message("order data not found");
    };
    if order.items.is_empty() {
        return StepResult::failed().with_message("order must contain at least one item");
    }
    if order.total_amount <= 0.0 {
        return StepResult::failed().with_message("invalid order amount");
    }
    StepResult::complete()
}

fn reserve_stock(ctx: &mut Context) -> StepResult {
    let Some(order) = load_order(ctx) else {
        return StepResult::failed();
    };
    for item in &order.items {
        ctx.log(&format!("reserving {} x {}", item.quantity, item.product_id));
    }
    let reserved: u32 = order.items.iter().map(|item| item.quantity).sum();
    StepResult::complete().with("reserved_units", reserved)
}

/// Payment gateway that rejects the first couple of calls.
struct PaymentGateway {
    calls: AtomicU32,
    flaky_calls: u32,
}

#[async_trait]
impl StepFn for PaymentGateway {
    async fn run(&self, ctx: &mut Context) -> StepResult {
        tokio::time::sleep(Duration::from_millis(10)).await;

        if self.calls.fetch_add(1, Ordering::SeqCst) < self.flaky_calls {
            return StepResult::error(StepError::new("gateway", "timeout"));
        }

        let Some(order) = load_order(ctx) else {
            return StepResult::failed();
        };
        let transaction_id = match order.payment_method {
            PaymentMethod::CreditCard => format!("CC-{}", order.id),
            PaymentMethod::BankTransfer => format!("BT-{}", order.id),
        };
        StepResult::complete()
            .with("transaction_id", transaction_id)
            .with_message("payment accepted")
    }
}

fn fulfilment() -> Branches {
    Branches::new(|ctx: &Context| match load_order(ctx).map(|o| o.payment_method) {
        Some(PaymentMethod::CreditCard) => BranchName::new("ship"),
        Some(PaymentMethod::BankTransfer) => BranchName::new("hold"),
        None => BranchName::new("none"),
    })
    .branch(Branch::new(
        "ship",
        vec![Step::new("arrange_shipping", |ctx: &mut Context| {
            let id = load_order(ctx).map(|o| o.id).unwrap_or_default();
            StepResult::complete().with("tracking_number", format!("TRACK-{}", id))
        })],
    ))
    .branch(Branch::new(
        "hold",
        vec![Step::new("await_transfer", |_ctx: &mut Context| {
            StepResult::skipped().with_message("shipping waits for the bank transfer")
        })],
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let order = Order {
        id: "ORD-001".to_string(),
        items: vec![
            OrderItem {
                product_id: "PROD-1".to_string(),
                quantity: 2,
            },
            OrderItem {
                product_id: "PROD-2".to_string(),
                quantity: 1,
            },
        ],
        total_amount: 129.90,
        payment_method: PaymentMethod::CreditCard,
    };

    let mut chain = Chain::new(vec![
        Step::new("validate", validate),
        Step::new("reserve_stock", reserve_stock),
        Step::with_handler(
            "charge",
            PaymentGateway {
                calls: AtomicU32::new(0),
                flaky_calls: 2,
            },
        )
        .with_opts(
            StepOpts::new()
                .max_run_attempts(4)
                .retry_on(StepError::new("gateway", "timeout"))
                .retry_sleep(RetrySleep::Fixed(Duration::from_millis(100))),
        )
        .with_branches(fulfilment()),
        Step::new("notify", |ctx: &mut Context| {
            let tracking: Option<String> = ctx.get("tracking_number");
            ctx.log(&format!("order processed, tracking: {:?}", tracking));
            StepResult::complete()
        }),
    ]);

    let mut ctx = Context::with_logger(Arc::new(TracingLogger::enabled()));
    ctx.insert("order", serde_json::to_value(&order)?);

    if let Err(e) = chain.execute(&mut ctx).await {
        eprintln!("Order chain failed: {}", e);
    }

    for (step, result) in ctx.progress_entries() {
        println!("{:<18} {}", step.as_str(), result.state());
    }

    Ok(())
}
