use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use skin_summaries::queue::{SqsQueue, enqueue_batch};
use skin_summaries::task::TriggerType;
use skin_summaries::types::ItemId;
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin enqueue-summary <item_id> [item_id...]");
        eprintln!(
            "Example: SUMMARY_QUEUE_URL=https://sqs.us-west-2.amazonaws.com/123456789012/skin-summaries-staging cargo run --bin enqueue-summary 42 1337"
        );
        std::process::exit(1);
    }

    let item_ids = args[1..]
        .iter()
        .map(|raw| ItemId::new(raw.as_str()).with_context(|| format!("Invalid item id {:?}", raw)))
        .collect::<Result<Vec<_>>>()?;

    let queue_url = env::var("SUMMARY_QUEUE_URL")
        .context("SUMMARY_QUEUE_URL environment variable must be set")?;

    println!("Initializing SQS client...");
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let queue = SqsQueue::new(aws_sdk_sqs::Client::new(&config), queue_url);

    // Operator-requested runs go out immediately; no herd to spread.
    let enqueued = enqueue_batch(&queue, &item_ids, TriggerType::AdHoc, Duration::ZERO).await;

    println!("Enqueued {} of {} ad hoc summary task(s)", enqueued, item_ids.len());
    if enqueued < item_ids.len() {
        std::process::exit(1);
    }
    Ok(())
}
