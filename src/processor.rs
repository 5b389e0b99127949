//! Per-task write-back: read the item and its comments, decide, generate,
//! and commit behind the `summary_generated_at` fence.

use crate::aggregator::{MAX_AGGREGATED_COMMENTS, eligible_comment_texts};
use crate::error::{Disposition, ProcessError};
use crate::generator::SummaryGenerator;
use crate::queue::{ReceivedTask, TaskQueue};
use crate::storage::{CommitOutcome, Storage};
use crate::task::SummaryTask;
use crate::trigger::TriggerPolicy;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span, error, field, info, info_span, warn};

pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

/// A task attempt that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The trigger did not fire; nothing was generated.
    Skipped { new_comments: usize },
    Completed { comments_used: usize },
}

impl TaskOutcome {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Completed { .. } => "completed",
        }
    }
}

pub struct TaskProcessor<S, G, Q> {
    storage: Arc<S>,
    generator: Arc<G>,
    queue: Arc<Q>,
    policy: TriggerPolicy,
    max_comments: usize,
    max_receive_count: u32,
}

impl<S, G, Q> TaskProcessor<S, G, Q>
where
    S: Storage,
    G: SummaryGenerator,
    Q: TaskQueue,
{
    pub fn new(storage: Arc<S>, generator: Arc<G>, queue: Arc<Q>) -> Self {
        Self {
            storage,
            generator,
            queue,
            policy: TriggerPolicy::default(),
            max_comments: MAX_AGGREGATED_COMMENTS,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }

    pub fn with_policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = max_receive_count;
        self
    }

    /// Run one task to completion, log its outcome, and delete it from the
    /// queue unless it should be retried. Never returns an error: every
    /// failure is contained here so the worker keeps polling.
    pub async fn process(&self, received: &ReceivedTask) -> Disposition {
        let span = info_span!(
            "task",
            message_id = %received.message_id,
            receive_count = received.receive_count,
            item_id = field::Empty,
            trigger = field::Empty,
        );
        self.process_inner(received).instrument(span).await
    }

    async fn process_inner(&self, received: &ReceivedTask) -> Disposition {
        let started = Instant::now();
        let result = self.run(received).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let disposition = match &result {
            Ok(outcome) => {
                match outcome {
                    TaskOutcome::Skipped { new_comments } => info!(
                        category = outcome.category(),
                        new_comments,
                        elapsed_ms,
                        "Summary not due, task discarded"
                    ),
                    TaskOutcome::Completed { comments_used } => info!(
                        category = outcome.category(),
                        comments_used,
                        elapsed_ms,
                        "Summary updated"
                    ),
                }
                Disposition::Delete
            }
            Err(e) => {
                let disposition = e.disposition();
                if e.is_alert_worthy() {
                    error!(category = e.category(), error = %e, ?disposition, elapsed_ms, "Task failed");
                } else if matches!(e, ProcessError::ConcurrentUpdate(_)) {
                    info!(category = e.category(), error = %e, elapsed_ms, "Item moved on, leaving task for redelivery");
                } else {
                    warn!(category = e.category(), error = %e, ?disposition, elapsed_ms, "Task failed");
                }
                disposition
            }
        };

        if disposition == Disposition::Delete {
            if let Err(e) = self.queue.delete(&received.receipt_handle).await {
                warn!(error = %e, "Failed to delete task; it will be redelivered");
            }
        }
        disposition
    }

    /// The decision path without any queue side effects.
    pub async fn run(&self, received: &ReceivedTask) -> Result<TaskOutcome, ProcessError> {
        if received.receive_count > self.max_receive_count {
            return Err(ProcessError::RetriesExhausted(received.receive_count));
        }

        let task = SummaryTask::from_body(&received.body)
            .map_err(|e| ProcessError::BadMessage(format!("{:#}", e)))?;

        let span = Span::current();
        span.record("item_id", field::display(&task.item_id));
        span.record("trigger", field::display(task.trigger_type));

        let snapshot = self
            .storage
            .load_snapshot(&task.item_id)
            .await?
            .ok_or_else(|| ProcessError::EntityNotFound(task.item_id.to_string()))?;

        let fence = snapshot.item.summary_generated_at;
        let texts = eligible_comment_texts(&snapshot.comments, fence, self.max_comments);

        if !self.policy.should_summarize(fence, texts.len(), Utc::now()) {
            return Ok(TaskOutcome::Skipped {
                new_comments: texts.len(),
            });
        }

        let summary = self
            .generator
            .generate(&snapshot.item.summary, &texts)
            .await?;

        let generated_at = next_generated_at(fence, Utc::now());
        match self
            .storage
            .commit_summary(&task.item_id, fence, &summary, generated_at)
            .await?
        {
            CommitOutcome::Committed => Ok(TaskOutcome::Completed {
                comments_used: texts.len(),
            }),
            CommitOutcome::FenceMismatch => {
                Err(ProcessError::ConcurrentUpdate(task.item_id.to_string()))
            }
        }
    }
}

/// The new fence value: now, but never at or before the previous one.
pub(crate) fn next_generated_at(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}
