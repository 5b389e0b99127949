use crate::task::{SummaryTask, TriggerType};
use crate::types::ItemId;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

pub mod sqs;
pub use sqs::SqsQueue;

pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(15);
/// Concurrent `SendMessage` calls issued by `enqueue_batch`.
pub const BATCH_ENQUEUE_CONCURRENCY: usize = 16;

/// A task handed out by `receive`, hidden from other receivers until it is
/// deleted or its visibility timeout expires.
#[derive(Debug, Clone)]
pub struct ReceivedTask {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// How many times this message has been received, including this one.
    pub receive_count: u32,
}

// ============================================================================
// TaskQueue trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait TaskQueue: Send + Sync {
    /// Publish a task that becomes visible after `delay`. Returns the
    /// message id.
    async fn enqueue(&self, task: &SummaryTask, delay: Duration) -> Result<String>;

    /// Long-poll for up to `max_messages` tasks.
    async fn receive(&self, max_messages: i32) -> Result<Vec<ReceivedTask>>;

    /// Remove a processed task. An expired receipt handle is not an error.
    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

/// Uniform random delay in `[0, max_jitter]`, at whole-second granularity
/// (the unit SQS accepts).
pub fn jittered_delay(max_jitter: Duration) -> Duration {
    let max_secs = max_jitter.as_secs();
    if max_secs == 0 {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0..=max_secs);
    Duration::from_secs(secs)
}

/// Enqueue a summarization task for one item.
///
/// Called from the comment-submission path, so failures are logged and
/// swallowed: the caller gets `None` and carries on.
pub async fn enqueue_summary_task<Q: TaskQueue>(
    queue: &Q,
    item_id: &ItemId,
    trigger: TriggerType,
    max_jitter: Duration,
) -> Option<String> {
    let task = SummaryTask::new(item_id.clone(), trigger);
    let delay = jittered_delay(max_jitter);

    match queue.enqueue(&task, delay).await {
        Ok(message_id) => {
            info!(
                item_id = %item_id,
                trigger = %trigger,
                message_id = %message_id,
                delay_secs = delay.as_secs(),
                "Summary task enqueued"
            );
            Some(message_id)
        }
        Err(e) => {
            warn!(
                item_id = %item_id,
                trigger = %trigger,
                error = %e,
                "Failed to enqueue summary task"
            );
            None
        }
    }
}

/// Enqueue one task per item, each with its own jitter, at most
/// `BATCH_ENQUEUE_CONCURRENCY` at a time. Returns how many were accepted by
/// the queue.
pub async fn enqueue_batch<Q: TaskQueue>(
    queue: &Q,
    item_ids: &[ItemId],
    trigger: TriggerType,
    max_jitter: Duration,
) -> usize {
    let results: Vec<Option<String>> = stream::iter(item_ids)
        .map(|id| enqueue_summary_task(queue, id, trigger, max_jitter))
        .buffer_unordered(BATCH_ENQUEUE_CONCURRENCY)
        .collect()
        .await;

    let enqueued = results.iter().filter(|r| r.is_some()).count();

    info!(
        trigger = %trigger,
        requested = item_ids.len(),
        enqueued,
        "Batch enqueue finished"
    );
    enqueued
}

// ============================================================================
// Test utilities — in-memory queue with a visibility clock
// ============================================================================
