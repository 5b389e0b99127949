//! Long-running summary worker.
//!
//! Architecture: comment handlers / sweep job -> SQS -> this worker -> DynamoDB
//!
//! Runs until SIGTERM or ctrl-c; the batch being processed at that point is
//! finished before exit.

use anyhow::Result;
use aws_config::BehaviorVersion;
use skin_summaries::config::WorkerConfig;
use skin_summaries::generator::AnthropicGenerator;
use skin_summaries::processor::TaskProcessor;
use skin_summaries::queue::SqsQueue;
use skin_summaries::storage::DynamoStorage;
use skin_summaries::worker::Worker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = WorkerConfig::from_env()?;

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&aws_config);
    let sqs_client = aws_sdk_sqs::Client::new(&aws_config);

    let storage = Arc::new(DynamoStorage::new(dynamodb_client, config.table_name.clone()));
    let queue = Arc::new(
        SqsQueue::new(sqs_client, config.queue_url.clone())
            .with_wait_time(config.wait_time)
            .with_visibility_timeout(config.visibility_timeout),
    );
    let generator = Arc::new(AnthropicGenerator::new(
        config.api_key.clone(),
        config.model.clone(),
    )?);

    let processor = TaskProcessor::new(storage, generator, Arc::clone(&queue))
        .with_max_receive_count(config.max_receive_count);
    let worker = Worker::new(processor, queue, config.worker_settings());

    info!(
        worker_id = %worker.id(),
        table = %config.table_name,
        model = %config.model,
        "Starting summary worker"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, finishing in-flight tasks");
        signal_token.cancel();
    });

    worker.run(shutdown).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "Failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            warn!(%err, "ctrl-c signal handler failed");
        }
    }
}
