//! Named FIFO work queue substrate: priority dequeue, retry/backoff,
//! bounded-concurrency workers, retention, and depth/event observability.
//! See spec.md §4.1. This is the coordination primitive every pipeline
//! stage communicates through instead of raw channels.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, Semaphore, broadcast};
use tokio::time::Instant;

use crate::error::PipelineError;

pub const PRIORITY_HIGH: i64 = 1;
pub const PRIORITY_MEDIUM: i64 = 5;
pub const PRIORITY_NORMAL: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub priority: i64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// If set, a handler invocation that runs longer than this is treated
    /// as stalled (§4.1 "Concurrency model") and reclaimed as a failed
    /// attempt. `None` means no lease supervision.
    pub lease_ms: Option<u64>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: PRIORITY_NORMAL,
            max_attempts: 1,
            base_delay_ms: 0,
            lease_ms: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: 1000,
            keep_failed: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDepth {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Completed(JobId),
    Failed(JobId, String),
    Stalled(JobId),
}

struct PendingJob<T> {
    id: JobId,
    payload: T,
    priority: i64,
    seq: u64,
    attempts_made: u32,
    max_attempts: u32,
    base_delay_ms: u64,
    lease_ms: Option<u64>,
}

// BinaryHeap is a max-heap; reverse the comparison so the job with the
// lowest (priority, seq) — highest actual priority, dispatched earliest
// among ties — pops first. This is the "(priority, enqueue_sequence)"
// ordering from spec.md §4.1.
impl<T> PartialEq for PendingJob<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<T> Eq for PendingJob<T> {}
impl<T> PartialOrd for PendingJob<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for PendingJob<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

struct DelayedJob<T> {
    job: PendingJob<T>,
    next_eligible_at: Instant,
}
impl<T> PartialEq for DelayedJob<T> {
    fn eq(&self, other: &Self) -> bool {
        self.next_eligible_at == other.next_eligible_at
    }
}
impl<T> Eq for DelayedJob<T> {}
impl<T> PartialOrd for DelayedJob<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for DelayedJob<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Earliest eligible time pops first.
        other.next_eligible_at.cmp(&self.next_eligible_at)
    }
}

struct QueueState<T> {
    ready: BinaryHeap<PendingJob<T>>,
    delayed: BinaryHeap<DelayedJob<T>>,
    active: usize,
    completed: VecDeque<JobId>,
    failed: VecDeque<(JobId, String)>,
    retention: RetentionPolicy,
    closed: bool,
}

struct QueueInner<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    events: broadcast::Sender<QueueEvent>,
    seq: AtomicU64,
    next_id: AtomicU64,
}

/// A single named queue. Cheaply `Clone`-able (an `Arc` handle); every
/// clone refers to the same underlying state.
pub struct Queue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Queue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_retention(name, RetentionPolicy::default())
    }

    pub fn with_retention(name: impl Into<String>, retention: RetentionPolicy) -> Self {
        let (events, _rx) = broadcast::channel(1024);
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                state: Mutex::new(QueueState {
                    ready: BinaryHeap::new(),
                    delayed: BinaryHeap::new(),
                    active: 0,
                    completed: VecDeque::new(),
                    failed: VecDeque::new(),
                    retention,
                    closed: false,
                }),
                notify: Notify::new(),
                events,
                seq: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Subscribe to `completed`/`failed`/`stalled` events. Each worker
    /// invocation emits exactly one terminal event.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Enqueue a payload. Never blocks indefinitely; fails only once the
    /// queue has been closed.
    pub async fn enqueue(&self, payload: T, opts: EnqueueOptions) -> Result<JobId, PipelineError> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(PipelineError::Transient(format!(
                "queue {} is closed",
                self.inner.name
            )));
        }
        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        state.ready.push(PendingJob {
            id,
            payload,
            priority: opts.priority,
            seq,
            attempts_made: 0,
            max_attempts: opts.max_attempts.max(1),
            base_delay_ms: opts.base_delay_ms,
            lease_ms: opts.lease_ms,
        });
        drop(state);
        self.inner.notify.notify_waiters();
        Ok(id)
    }

    pub async fn depth(&self) -> QueueDepth {
        let state = self.inner.state.lock().await;
        QueueDepth {
            waiting: state.ready.len(),
            active: state.active,
            delayed: state.delayed.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
        }
    }

    /// Stop accepting new enqueues and wake the dispatcher so it can drain.
    pub async fn close(&self) {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// Register a handler with bounded concurrency. Spawns a single
    /// dispatcher task that gates at most `concurrency` concurrent handler
    /// invocations behind a semaphore and returns its `JoinHandle` so a
    /// caller can await full drain after `close()`.
    pub fn register_worker<F, Fut>(
        &self,
        handler: F,
        concurrency: usize,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        tokio::spawn(async move {
            loop {
                promote_delayed(&inner).await;

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let job = match next_ready_job(&inner).await {
                    Some(job) => job,
                    None => {
                        drop(permit);
                        break;
                    }
                };

                let handler = handler.clone();
                let inner = inner.clone();
                tokio::spawn(run_attempt(inner, handler, job, permit));
            }
        })
    }
}

/// Move any delayed jobs whose backoff has elapsed into the ready heap.
async fn promote_delayed<T>(inner: &Arc<QueueInner<T>>) {
    let mut state = inner.state.lock().await;
    let now = Instant::now();
    let mut promoted = Vec::new();
    while let Some(top) = state.delayed.peek() {
        if top.next_eligible_at <= now {
            promoted.push(state.delayed.pop().unwrap().job);
        } else {
            break;
        }
    }
    for job in promoted {
        state.ready.push(job);
    }
}

/// Block until a ready job is available, the queue closes with nothing left
/// to drain, or a delayed job becomes eligible (in which case it is
/// promoted and the wait is retried).
async fn next_ready_job<T>(inner: &Arc<QueueInner<T>>) -> Option<PendingJob<T>> {
    loop {
        {
            let mut state = inner.state.lock().await;
            if let Some(job) = state.ready.pop() {
                state.active += 1;
                return Some(job);
            }
            if state.closed && state.delayed.is_empty() {
                return None;
            }
        }
        let wake_at = {
            let state = inner.state.lock().await;
            state.delayed.peek().map(|d| d.next_eligible_at)
        };
        match wake_at {
            Some(at) => {
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = tokio::time::sleep_until(at) => {}
                }
            }
            None => inner.notify.notified().await,
        }
        promote_delayed(inner).await;
    }
}

async fn run_attempt<T, F, Fut>(
    inner: Arc<QueueInner<T>>,
    handler: Arc<F>,
    mut job: PendingJob<T>,
    permit: tokio::sync::OwnedSemaphorePermit,
) where
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    let _permit = permit;
    job.attempts_made += 1;
    let attempt_payload = job.payload.clone();
    let invocation = handler(attempt_payload);
    let outcome = match job.lease_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), invocation).await {
            Ok(result) => result,
            Err(_) => {
                let _ = inner.events.send(QueueEvent::Stalled(job.id));
                Err(PipelineError::Transient(format!(
                    "job stalled past {}ms lease",
                    ms
                )))
            }
        },
        None => invocation.await,
    };

    let mut state = inner.state.lock().await;
    state.active -= 1;
    match outcome {
        Ok(()) => {
            state.completed.push_back(job.id);
            while state.completed.len() > state.retention.keep_completed {
                state.completed.pop_front();
            }
            drop(state);
            let _ = inner.events.send(QueueEvent::Completed(job.id));
        }
        Err(e) => {
            if e.is_retryable() && job.attempts_made < job.max_attempts {
                let delay_ms = job.base_delay_ms * 2u64.pow(job.attempts_made.saturating_sub(1));
                let next_eligible_at = Instant::now() + Duration::from_millis(delay_ms);
                state.delayed.push(DelayedJob {
                    job,
                    next_eligible_at,
                });
                drop(state);
                inner.notify.notify_waiters();
                return;
            }
            let message = e.to_string();
            state.failed.push_back((job.id, message.clone()));
            while state.failed.len() > state.retention.keep_failed {
                state.failed.pop_front();
            }
            drop(state);
            let _ = inner.events.send(QueueEvent::Failed(job.id, message));
        }
    }
    inner.notify.notify_waiters();
}
