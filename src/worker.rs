//! Long-running consumer: polls the queue, hands tasks to the processor and
//! stops cleanly on shutdown.

use crate::error::Disposition;
use crate::generator::SummaryGenerator;
use crate::processor::TaskProcessor;
use crate::queue::TaskQueue;
use crate::storage::Storage;
use futures::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// IdleBackoff — exponential polling interval while the queue is empty
// ============================================================================

#[derive(Debug, Clone)]
pub struct IdleBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl IdleBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait now; the following call returns double, up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

// ============================================================================
// InFlight — counts tasks currently being processed
// ============================================================================

#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

pub struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
}

impl InFlight {
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { in_flight: self }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolve once no task is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Tasks from one batch processed at the same time.
    pub concurrency: usize,
    pub max_messages: i32,
    pub idle_base: Duration,
    pub idle_max: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_messages: 10,
            idle_base: Duration::from_secs(1),
            idle_max: Duration::from_secs(30),
        }
    }
}

/// Totals for one `run`, reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: u64,
    pub received: u64,
    pub deleted: u64,
    pub redelivered: u64,
    pub receive_errors: u64,
}

pub struct Worker<S, G, Q> {
    id: String,
    processor: TaskProcessor<S, G, Q>,
    queue: Arc<Q>,
    settings: WorkerSettings,
    in_flight: InFlight,
}

impl<S, G, Q> Worker<S, G, Q>
where
    S: Storage,
    G: SummaryGenerator,
    Q: TaskQueue,
{
    pub fn new(processor: TaskProcessor<S, G, Q>, queue: Arc<Q>, settings: WorkerSettings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            processor,
            queue,
            settings,
            in_flight: InFlight::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Poll until `shutdown` is cancelled. A batch that has started is
    /// always finished before returning; no new receive starts after
    /// cancellation.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerStats {
        info!(
            worker_id = %self.id,
            concurrency = self.settings.concurrency,
            max_messages = self.settings.max_messages,
            "Worker started"
        );

        let mut stats = WorkerStats::default();
        let mut backoff = IdleBackoff::new(self.settings.idle_base, self.settings.idle_max);

        while !shutdown.is_cancelled() {
            stats.polls += 1;
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.queue.receive(self.settings.max_messages) => received,
            };

            let tasks = match received {
                Ok(tasks) => tasks,
                Err(e) => {
                    stats.receive_errors += 1;
                    let delay = backoff.next_delay();
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Receive failed");
                    sleep_or_cancel(delay, &shutdown).await;
                    continue;
                }
            };

            if tasks.is_empty() {
                let delay = backoff.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Queue empty, backing off");
                sleep_or_cancel(delay, &shutdown).await;
                continue;
            }

            backoff.reset();
            stats.received += tasks.len() as u64;

            let dispositions: Vec<Disposition> = stream::iter(tasks)
                .map(|task| async move {
                    let _guard = self.in_flight.enter();
                    self.processor.process(&task).await
                })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;

            for disposition in dispositions {
                match disposition {
                    Disposition::Delete => stats.deleted += 1,
                    Disposition::Redeliver => stats.redelivered += 1,
                }
            }
        }

        let pending = self.in_flight.count();
        if pending > 0 {
            info!(pending, "Waiting for in-flight tasks");
        }
        self.in_flight.wait_idle().await;

        info!(
            worker_id = %self.id,
            polls = stats.polls,
            received = stats.received,
            deleted = stats.deleted,
            redelivered = stats.redelivered,
            receive_errors = stats.receive_errors,
            "Worker stopped"
        );
        stats
    }
}

async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorError;
    use crate::generator::test_utils::FakeGenerator;
    use crate::queue::test_utils::InMemoryQueue;
    use crate::storage::test_utils::InMemoryStorage;
    use crate::task::{SummaryTask, TriggerType};
    use crate::types::{ApprovalStatus, Comment, Item, ItemId};
    use chrono::Utc;

    type TestWorker = Worker<InMemoryStorage, FakeGenerator, InMemoryQueue>;

    fn seeded_storage(ids: &[&str]) -> InMemoryStorage {
        let mut storage = InMemoryStorage::new();
        for id in ids {
            let item_id = ItemId::new(*id).unwrap();
            storage = storage.with_item(Item::new(item_id.clone())).with_comments(
                &item_id,
                vec![Comment {
                    id: format!("{}-c1", id),
                    text: format!("great skin {}", id),
                    status: ApprovalStatus::Approved,
                    created_at: Utc::now() - chrono::Duration::hours(1),
                    replies: Vec::new(),
                }],
            );
        }
        storage
    }

    fn worker(
        storage: InMemoryStorage,
        generator: FakeGenerator,
        settings: WorkerSettings,
    ) -> (TestWorker, Arc<InMemoryStorage>, Arc<FakeGenerator>, Arc<InMemoryQueue>) {
        let storage = Arc::new(storage);
        let generator = Arc::new(generator);
        let queue = Arc::new(InMemoryQueue::new());
        let processor = TaskProcessor::new(
            Arc::clone(&storage),
            Arc::clone(&generator),
            Arc::clone(&queue),
        );
        let worker = Worker::new(processor, Arc::clone(&queue), settings);
        (worker, storage, generator, queue)
    }

    fn enqueue(queue: &InMemoryQueue, id: &str) {
        queue.push_task(&SummaryTask::new(ItemId::new(id).unwrap(), TriggerType::NewComment));
    }

    #[test]
    fn idle_backoff_doubles_to_ceiling_and_resets() {
        let mut backoff = IdleBackoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn idle_backoff_ceiling_never_below_base() {
        let mut backoff = IdleBackoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn in_flight_counts_guards() {
        let in_flight = InFlight::default();
        in_flight.wait_idle().await;

        let first = in_flight.enter();
        let second = in_flight.enter();
        assert_eq!(in_flight.count(), 2);
        drop(first);
        assert_eq!(in_flight.count(), 1);

        let (_, ()) = tokio::join!(in_flight.wait_idle(), async move {
            tokio::task::yield_now().await;
            drop(second);
        });
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drains_queue_then_stops_on_shutdown() {
        let (worker, storage, _generator, queue) = worker(
            seeded_storage(&["a", "b", "c"]),
            FakeGenerator::new(),
            WorkerSettings {
                concurrency: 2,
                ..WorkerSettings::default()
            },
        );
        for id in ["a", "b", "c"] {
            enqueue(&queue, id);
        }

        let shutdown = CancellationToken::new();
        let (stats, ()) = tokio::join!(worker.run(shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            shutdown.cancel();
        });

        assert_eq!(stats.received, 3);
        assert_eq!(stats.deleted, 3);
        assert_eq!(queue.len(), 0);
        assert_eq!(storage.commit_count(), 3);
        assert_eq!(worker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_polling_backs_off_exponentially() {
        let (worker, _storage, _generator, _queue) = worker(
            InMemoryStorage::new(),
            FakeGenerator::new(),
            WorkerSettings {
                idle_base: Duration::from_secs(1),
                idle_max: Duration::from_secs(8),
                ..WorkerSettings::default()
            },
        );

        // Polls at 0, 1, 3, 7, 15 and 23s; the cancel at 25s cuts the last
        // sleep short.
        let shutdown = CancellationToken::new();
        let (stats, ()) = tokio::join!(worker.run(shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(25)).await;
            shutdown.cancel();
        });

        assert_eq!(stats.polls, 6);
        assert_eq!(stats.received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_does_not_stop_polling() {
        let generator = FakeGenerator::new()
            .then(Err(GeneratorError::Transport("connection reset".into())));
        let (worker, storage, _generator, queue) = worker(
            seeded_storage(&["a", "b"]),
            generator,
            WorkerSettings::default(),
        );
        enqueue(&queue, "a");
        enqueue(&queue, "b");

        let shutdown = CancellationToken::new();
        let (stats, ()) = tokio::join!(worker.run(shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            shutdown.cancel();
        });

        assert_eq!(stats.redelivered, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(storage.commit_count(), 1);
        // The failed task is still queued, hidden until its visibility expires.
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_the_current_task_finish() {
        let generator = FakeGenerator::new().with_delay(Duration::from_secs(10));
        let (worker, storage, _generator, queue) = worker(
            seeded_storage(&["a"]),
            generator,
            WorkerSettings::default(),
        );
        enqueue(&queue, "a");

        let shutdown = CancellationToken::new();
        let (stats, ()) = tokio::join!(worker.run(shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(worker.in_flight(), 1);
            shutdown.cancel();
        });

        assert_eq!(stats.deleted, 1);
        assert_eq!(storage.commit_count(), 1);
        assert_eq!(queue.len(), 0);
        assert_eq!(worker.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_polls() {
        let (worker, _storage, _generator, queue) = worker(
            seeded_storage(&["a"]),
            FakeGenerator::new(),
            WorkerSettings::default(),
        );
        enqueue(&queue, "a");

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let stats = worker.run(shutdown).await;

        assert_eq!(stats, WorkerStats::default());
        assert_eq!(queue.len(), 1);
    }
}
