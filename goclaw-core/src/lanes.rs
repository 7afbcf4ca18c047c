//! Command-lane scheduler: named FIFO lanes with independent
//! bounded concurrency, so user turns, cron jobs, and probes never
//! head-of-line-block one another while each lane preserves in-order
//! semantics for stateful sessions.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex, RwLock};

/// Lanes pre-registered at startup; others are created lazily.
pub const MAIN: &str = "main";
pub const CRON: &str = "cron";
pub const SUBAGENT: &str = "subagent";
pub const AUTH_PROBE: &str = "auth-probe";
pub const BACKGROUND: &str = "background";

const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_WARN_AFTER: Duration = Duration::from_millis(2000);
const QUIESCENCE_POLL_INTERVAL: Duration = Duration::from_millis(250);

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type WaitHook = Arc<dyn Fn(u64, usize) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error("task cancelled before completion")]
    Cancelled,
}

/// Per-call options. `warn_after` and `on_wait` apply to this enqueue only; the hook
/// fires once if dequeue wait exceeds the threshold.
#[derive(Clone, Default)]
pub struct EnqueueOptions {
    pub warn_after: Option<Duration>,
    pub on_wait: Option<WaitHook>,
}

struct QueueEntry {
    task_id: u64,
    enqueued_at: Instant,
    warn_after: Duration,
    on_wait: Option<WaitHook>,
    job: BoxFuture,
}

#[derive(Default)]
struct LaneState {
    queue: VecDeque<QueueEntry>,
    active: HashSet<u64>,
}

struct Lane {
    state: Mutex<LaneState>,
    concurrency: AtomicUsize,
}

impl Lane {
    fn new(concurrency: usize) -> Self {
        Self {
            state: Mutex::new(LaneState::default()),
            concurrency: AtomicUsize::new(concurrency),
        }
    }
}

/// Dequeues while `active < cap`, spawning each task; on completion the spawned
/// task recurses into `drain` so the next queued entry (if any) gets picked up
/// without waiting for another `enqueue` call. Checking capacity and admitting the
/// next entry happen under one lock so concurrent `enqueue` calls can't race the cap.
fn drain(lane: Arc<Lane>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        loop {
            let cap = lane.concurrency.load(Ordering::SeqCst);
            let (entry, queued_ahead) = {
                let mut state = lane.state.lock().await;
                if state.active.len() >= cap {
                    return;
                }
                let entry = state.queue.pop_front();
                if let Some(e) = &entry {
                    state.active.insert(e.task_id);
                }
                (entry, state.queue.len())
            };
            let Some(entry) = entry else { return };

            let wait = entry.enqueued_at.elapsed();
            if wait >= entry.warn_after {
                if let Some(hook) = &entry.on_wait {
                    hook(wait.as_millis() as u64, queued_ahead);
                }
            }

            let lane_for_task = lane.clone();
            let task_id = entry.task_id;
            let job = entry.job;
            tokio::spawn(async move {
                job.await;
                lane_for_task.state.lock().await.active.remove(&task_id);
                drain(lane_for_task).await;
            });
        }
    })
}

/// Multi-lane FIFO scheduler.
pub struct LaneScheduler {
    lanes: RwLock<std::collections::HashMap<String, Arc<Lane>>>,
    next_task_id: AtomicU64,
}

impl Default for LaneScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneScheduler {
    pub fn new() -> Self {
        let mut lanes = std::collections::HashMap::new();
        lanes.insert(MAIN.to_string(), Arc::new(Lane::new(4)));
        for name in [CRON, SUBAGENT, AUTH_PROBE, BACKGROUND] {
            lanes.insert(name.to_string(), Arc::new(Lane::new(DEFAULT_CONCURRENCY)));
        }
        Self {
            lanes: RwLock::new(lanes),
            next_task_id: AtomicU64::new(1),
        }
    }

    async fn lane(&self, name: &str) -> Arc<Lane> {
        if let Some(lane) = self.lanes.read().await.get(name) {
            return lane.clone();
        }
        let mut lanes = self.lanes.write().await;
        lanes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Lane::new(DEFAULT_CONCURRENCY)))
            .clone()
    }

    /// Sets the max-concurrency cap for `lane`, creating it if it doesn't exist.
    pub async fn set_lane_concurrency(&self, lane: &str, n: usize) {
        let lane = self.lane(lane).await;
        lane.concurrency.store(n.max(1), Ordering::SeqCst);
    }

    /// Appends `task` to `lane`'s FIFO queue and awaits its result. Runs the drain
    /// loop immediately so the task may start executing before this call returns.
    pub async fn enqueue<F, Fut, T>(
        &self,
        lane_name: &str,
        opts: EnqueueOptions,
        task: F,
    ) -> Result<T, LaneError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let lane = self.lane(lane_name).await;
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        let job: BoxFuture = Box::pin(async move {
            let result = task().await;
            let _ = tx.send(result);
        });

        {
            let mut state = lane.state.lock().await;
            state.queue.push_back(QueueEntry {
                task_id,
                enqueued_at: Instant::now(),
                warn_after: opts.warn_after.unwrap_or(DEFAULT_WARN_AFTER),
                on_wait: opts.on_wait,
                job,
            });
        }

        drain(lane.clone()).await;
        rx.await.map_err(|_| LaneError::Cancelled)
    }

    /// Number of queued (not yet running) tasks in `lane`.
    pub async fn queue_size(&self, lane: &str) -> usize {
        self.lane(lane).await.state.lock().await.queue.len()
    }

    /// Total active (running) task count across every lane.
    pub async fn active_task_count(&self) -> usize {
        let lanes = self.lanes.read().await;
        let mut total = 0;
        for lane in lanes.values() {
            total += lane.state.lock().await.active.len();
        }
        total
    }

    /// Drops all queued (not yet running) tasks in `lane`, returning how many were
    /// removed. Already-running tasks are unaffected.
    pub async fn clear(&self, lane: &str) -> usize {
        let lane = self.lane(lane).await;
        let mut state = lane.state.lock().await;
        let n = state.queue.len();
        state.queue.clear();
        n
    }

    /// Snapshots the currently active task ids across all lanes and polls at
    /// [`QUIESCENCE_POLL_INTERVAL`] until none remain active, or returns `false` once
    /// `timeout` elapses. Tasks enqueued after the snapshot don't extend the wait.
    pub async fn wait_quiescence(&self, timeout: Duration) -> bool {
        let snapshot = self.snapshot_active_ids().await;
        if snapshot.is_empty() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let still_active = self.snapshot_active_ids().await;
            if snapshot.is_disjoint(&still_active) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(QUIESCENCE_POLL_INTERVAL).await;
        }
    }

    async fn snapshot_active_ids(&self) -> HashSet<u64> {
        let lanes = self.lanes.read().await;
        let mut ids = HashSet::new();
        for lane in lanes.values() {
            ids.extend(lane.state.lock().await.active.iter().copied());
        }
        ids
    }

    /// Per-lane queue/active/capacity snapshot for every lane that has been
    /// touched since startup, used by the gateway's `lanes.status` RPC.
    pub async fn status(&self) -> Vec<LaneStatus> {
        let lanes = self.lanes.read().await;
        let mut out = Vec::with_capacity(lanes.len());
        for (name, lane) in lanes.iter() {
            let state = lane.state.lock().await;
            out.push(LaneStatus {
                name: name.clone(),
                queued: state.queue.len(),
                active: state.active.len(),
                max_concurrent: lane.concurrency.load(Ordering::SeqCst),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

/// Snapshot of one lane's `LaneState`.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct LaneStatus {
    pub name: String,
    pub queued: usize,
    pub active: usize,
    pub max_concurrent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[tokio::test]
    async fn tasks_in_a_lane_run_in_insertion_order() {
        let scheduler = LaneScheduler::new();
        scheduler.set_lane_concurrency(MAIN, 1).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let order = order.clone();
            handles.push(scheduler.enqueue(MAIN, EnqueueOptions::default(), move || async move {
                order.lock().await.push(i);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn concurrency_cap_limits_simultaneous_tasks() {
        let scheduler = Arc::new(LaneScheduler::new());
        scheduler.set_lane_concurrency(BACKGROUND, 2).await;
        let concurrent = Arc::new(StdAtomicUsize::new(0));
        let max_seen = Arc::new(StdAtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .enqueue(BACKGROUND, EnqueueOptions::default(), move || async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn clear_drops_queued_but_not_running_tasks() {
        let scheduler = Arc::new(LaneScheduler::new());
        scheduler.set_lane_concurrency(SUBAGENT, 1).await;

        let scheduler2 = scheduler.clone();
        let running = tokio::spawn(async move {
            scheduler2
                .enqueue(SUBAGENT, EnqueueOptions::default(), || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let scheduler3 = scheduler.clone();
        let _queued = tokio::spawn(async move {
            let _ = scheduler3
                .enqueue(SUBAGENT, EnqueueOptions::default(), || async {})
                .await;
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let removed = scheduler.clear(SUBAGENT).await;
        assert_eq!(removed, 1);
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_quiescence_returns_true_once_snapshotted_tasks_finish() {
        let scheduler = Arc::new(LaneScheduler::new());
        let scheduler2 = scheduler.clone();
        let handle = tokio::spawn(async move {
            scheduler2
                .enqueue(MAIN, EnqueueOptions::default(), || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let drained = scheduler.wait_quiescence(Duration::from_secs(1)).await;
        assert!(drained);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_quiescence_times_out_when_task_outlives_deadline() {
        let scheduler = Arc::new(LaneScheduler::new());
        let scheduler2 = scheduler.clone();
        let handle = tokio::spawn(async move {
            scheduler2
                .enqueue(MAIN, EnqueueOptions::default(), || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let drained = scheduler.wait_quiescence(Duration::from_millis(20)).await;
        assert!(!drained);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn on_wait_hook_fires_when_threshold_exceeded() {
        let scheduler = Arc::new(LaneScheduler::new());
        scheduler.set_lane_concurrency(CRON, 1).await;
        let fired = Arc::new(StdAtomicUsize::new(0));

        let scheduler2 = scheduler.clone();
        let blocker = tokio::spawn(async move {
            scheduler2
                .enqueue(CRON, EnqueueOptions::default(), || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fired_clone = fired.clone();
        let opts = EnqueueOptions {
            warn_after: Some(Duration::from_millis(1)),
            on_wait: Some(Arc::new(move |_wait_ms, _ahead| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })),
        };
        scheduler.enqueue(CRON, opts, || async {}).await.unwrap();
        blocker.await.unwrap().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
