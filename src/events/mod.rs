//! Event sink (C6): the orchestrator hands every check outcome to
//! [`EventSink::submit`] and moves on without waiting on a database write.
//! A background worker batches events off a bounded queue and persists them
//! through [`EventRepository`], retrying transient failures with backoff
//! before giving up on a batch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::domain::RateLimitEvent;
use crate::repository::EventRepository;
use crate::resilience::RetryConfig;

/// What happens to new events once the queue is at `queue_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the incoming event; the queue keeps what it already has.
    DropNewest,
    /// Discard the longest-queued event to make room for the incoming one.
    DropOldest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSinkConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_overflow_policy")]
    pub overflow_policy: OverflowPolicy,
    #[serde(default = "default_write_retry")]
    pub write_retry: RetryConfig,
    #[serde(default = "default_drain_timeout_ms")]
    pub shutdown_drain_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    10_000
}
fn default_batch_size() -> usize {
    200
}
fn default_flush_interval_ms() -> u64 {
    1_000
}
fn default_overflow_policy() -> OverflowPolicy {
    OverflowPolicy::DropOldest
}
fn default_write_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        ..RetryConfig::default()
    }
}
fn default_drain_timeout_ms() -> u64 {
    5_000
}

impl Default for EventSinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            overflow_policy: default_overflow_policy(),
            write_retry: default_write_retry(),
            shutdown_drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

struct Queue {
    items: AsyncMutex<VecDeque<RateLimitEvent>>,
    capacity: usize,
    overflow_policy: OverflowPolicy,
    readable: Notify,
}

impl Queue {
    async fn push(&self, event: RateLimitEvent) {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            match self.overflow_policy {
                OverflowPolicy::DropNewest => {
                    metrics::counter!("ratelimit_events_dropped_total", "reason" => "queue_full").increment(1);
                    return;
                }
                OverflowPolicy::DropOldest => {
                    items.pop_front();
                    metrics::counter!("ratelimit_events_dropped_total", "reason" => "queue_full").increment(1);
                }
            }
        }
        items.push_back(event);
        drop(items);
        metrics::counter!("ratelimit_events_enqueued_total").increment(1);
        self.readable.notify_one();
    }

    async fn drain_up_to(&self, max: usize) -> Vec<RateLimitEvent> {
        let mut items = self.items.lock().await;
        let take = max.min(items.len());
        items.drain(..take).collect()
    }

    async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}

/// Bounded, non-blocking sink between the hot check path and the event
/// store. `submit` never awaits a lock for long and never touches the
/// network; the worker task owns every database write.
pub struct EventSink {
    queue: Arc<Queue>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl EventSink {
    /// Spawns the background worker and returns a handle to it. The worker
    /// runs until [`EventSink::shutdown`] is called.
    pub fn start(config: EventSinkConfig, repository: Arc<dyn EventRepository>) -> Arc<Self> {
        let queue = Arc::new(Queue {
            items: AsyncMutex::new(VecDeque::with_capacity(config.batch_size)),
            capacity: config.queue_capacity,
            overflow_policy: config.overflow_policy,
            readable: Notify::new(),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_notify = Arc::new(Notify::new());

        let worker = tokio::spawn(run_worker(
            queue.clone(),
            repository,
            config.batch_size,
            Duration::from_millis(config.flush_interval_ms),
            config.write_retry,
            shutdown.clone(),
            shutdown_notify.clone(),
        ));

        Arc::new(Self {
            queue,
            shutdown,
            shutdown_notify,
            worker: AsyncMutex::new(Some(worker)),
            drain_timeout: Duration::from_millis(config.shutdown_drain_timeout_ms),
        })
    }

    /// Enqueues an event for persistence. Returns immediately; the caller
    /// never observes a database round trip here.
    pub fn submit(&self, event: RateLimitEvent) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            queue.push(event).await;
        });
    }

    /// Signals the worker to stop accepting new ticks and flush whatever is
    /// queued, waiting up to `shutdown_drain_timeout_ms` before returning.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(self.drain_timeout, handle).await;
        }
    }

    /// Current queue depth, used by the operational cache-statistics tick
    /// and by tests asserting backpressure/drain behavior.
    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }
}

async fn run_worker(
    queue: Arc<Queue>,
    repository: Arc<dyn EventRepository>,
    batch_size: usize,
    flush_interval: Duration,
    retry: RetryConfig,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = queue.readable.notified() => {}
            _ = shutdown_notify.notified() => {}
        }

        flush_batch(&queue, &repository, batch_size, &retry).await;

        if shutdown.load(Ordering::SeqCst) && queue.len().await == 0 {
            break;
        }
    }

    // Final drain in case the loop exited with a non-empty queue left by a
    // flush that itself dropped a batch after exhausting retries.
    while queue.len().await > 0 {
        flush_batch(&queue, &repository, batch_size, &retry).await;
    }
}

async fn flush_batch(queue: &Arc<Queue>, repository: &Arc<dyn EventRepository>, batch_size: usize, retry: &RetryConfig) {
    let batch = queue.drain_up_to(batch_size).await;
    if batch.is_empty() {
        return;
    }

    let mut attempt = 0;
    loop {
        match repository.insert_batch(&batch).await {
            Ok(()) => {
                metrics::counter!("ratelimit_events_persisted_total").increment(batch.len() as u64);
                return;
            }
            Err(err) if attempt + 1 < retry.max_attempts => {
                tracing::warn!(error = %err, attempt, "event batch write failed, retrying");
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(error = %err, batch_size = batch.len(), "event batch write failed, dropping batch");
                metrics::counter!("ratelimit_events_dropped_total", "reason" => "write_failed").increment(batch.len() as u64);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IdentifierType;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    struct CountingRepository {
        calls: AtomicUsize,
        received: AsyncMutex<Vec<RateLimitEvent>>,
    }

    #[async_trait::async_trait]
    impl EventRepository for CountingRepository {
        async fn insert_batch(&self, events: &[RateLimitEvent]) -> Result<(), crate::repository::RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.received.lock().await.extend_from_slice(events);
            Ok(())
        }

        async fn counts(
            &self,
            _policy_id: Uuid,
            _from: chrono::DateTime<Utc>,
            _to: chrono::DateTime<Utc>,
        ) -> Result<crate::repository::EventCounts, crate::repository::RepositoryError> {
            unimplemented!()
        }

        async fn rejected_by_identifier_since(
            &self,
            _policy_id: Uuid,
            _since: chrono::DateTime<Utc>,
        ) -> Result<Vec<(String, i64)>, crate::repository::RepositoryError> {
            unimplemented!()
        }
    }

    fn event() -> RateLimitEvent {
        RateLimitEvent {
            policy_id: Uuid::new_v4(),
            identifier: "user-1".into(),
            identifier_type: IdentifierType::User,
            allowed: true,
            remaining: 9,
            limit_value: 10,
            ip_address: None,
            resource: None,
            event_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn submitted_events_reach_the_repository() {
        let repo = Arc::new(CountingRepository {
            calls: AtomicUsize::new(0),
            received: AsyncMutex::new(Vec::new()),
        });
        let config = EventSinkConfig {
            flush_interval_ms: 20,
            ..EventSinkConfig::default()
        };
        let sink = EventSink::start(config, repo.clone());

        sink.submit(event());
        sink.submit(event());

        tokio::time::sleep(Duration::from_millis(100)).await;
        sink.shutdown().await;

        assert_eq!(repo.received.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn drop_newest_discards_incoming_event_when_full() {
        let queue = Arc::new(Queue {
            items: AsyncMutex::new(VecDeque::new()),
            capacity: 1,
            overflow_policy: OverflowPolicy::DropNewest,
            readable: Notify::new(),
        });

        queue.push(event()).await;
        queue.push(event()).await;

        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn drop_oldest_keeps_most_recent_event() {
        let queue = Arc::new(Queue {
            items: AsyncMutex::new(VecDeque::new()),
            capacity: 1,
            overflow_policy: OverflowPolicy::DropOldest,
            readable: Notify::new(),
        });

        let mut first = event();
        first.identifier = "first".into();
        let mut second = event();
        second.identifier = "second".into();

        queue.push(first).await;
        queue.push(second).await;

        let remaining = queue.drain_up_to(10).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].identifier, "second");
    }

    #[tokio::test]
    async fn shutdown_drains_pending_events_before_returning() {
        let repo = Arc::new(CountingRepository {
            calls: AtomicUsize::new(0),
            received: AsyncMutex::new(Vec::new()),
        });
        let config = EventSinkConfig {
            flush_interval_ms: 5_000,
            ..EventSinkConfig::default()
        };
        let sink = EventSink::start(config, repo.clone());

        for _ in 0..5 {
            sink.submit(event());
        }
        // give the spawned submit tasks a chance to enqueue before shutdown
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.queue_len().await > 0);

        sink.shutdown().await;

        assert_eq!(repo.received.lock().await.len(), 5);
    }
}
