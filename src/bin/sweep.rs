//! Scheduled Lambda that enqueues a `scheduled-check` task for every item.
//!
//! Architecture: EventBridge schedule -> this Lambda -> SQS
//!
//! Items that are not due are skipped cheaply by the worker, so the sweep
//! does not try to filter.

use aws_config::BehaviorVersion;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde_json::{Value, json};
use skin_summaries::config::SweepConfig;
use skin_summaries::queue::{SqsQueue, enqueue_batch};
use skin_summaries::storage::{DynamoStorage, Storage};
use skin_summaries::task::TriggerType;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

struct SweepState {
    storage: DynamoStorage,
    queue: SqsQueue,
    max_jitter: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = SweepConfig::from_env().map_err(|e| Error::from(e.to_string()))?;

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let state = Arc::new(SweepState {
        storage: DynamoStorage::new(
            aws_sdk_dynamodb::Client::new(&aws_config),
            config.table_name,
        ),
        queue: SqsQueue::new(aws_sdk_sqs::Client::new(&aws_config), config.queue_url),
        max_jitter: config.max_jitter,
    });

    lambda_runtime::run(service_fn(|event| handler(event, state.clone()))).await?;
    Ok(())
}

async fn handler(_event: LambdaEvent<Value>, state: Arc<SweepState>) -> Result<Value, Error> {
    info!("Starting summary sweep");

    let item_ids = state
        .storage
        .list_item_ids()
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let enqueued = enqueue_batch(
        &state.queue,
        &item_ids,
        TriggerType::ScheduledCheck,
        state.max_jitter,
    )
    .await;

    info!(items = item_ids.len(), enqueued, "Summary sweep completed");
    Ok(json!({ "items": item_ids.len(), "enqueued": enqueued }))
}
