//! Per-key sequencer: one FIFO lane per key.
//!
//! Tasks submitted under the same key run one at a time, in submission order,
//! each to full completion (every `.await` inside the task keeps the lane
//! held). Tasks under different keys run concurrently on the runtime.
//!
//! A lane is a spawned worker draining an unbounded queue. Workers exit when
//! their queue drains and are respawned by the next submission; enqueue and
//! lane removal both happen under the lane map lock, so no job is stranded.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Lanes<K> = Arc<Mutex<HashMap<K, mpsc::UnboundedSender<Job>>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("task panicked")]
    TaskPanicked,
    #[error("lane shut down before the task completed")]
    LaneClosed,
}

/// Result of a submitted task. Dropping the ticket does not cancel the task.
pub struct Ticket<T> {
    rx: oneshot::Receiver<Result<T, SequencerError>>,
}

impl<T> Future for Ticket<T> {
    type Output = Result<T, SequencerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(SequencerError::LaneClosed)))
    }
}

pub struct Sequencer<K> {
    lanes: Lanes<K>,
}

impl<K> Clone for Sequencer<K> {
    fn clone(&self) -> Self {
        Self {
            lanes: Arc::clone(&self.lanes),
        }
    }
}

impl<K> Default for Sequencer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Sequencer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enqueue `task` on `key`'s lane. Must be called from within a tokio
    /// runtime.
    pub fn submit<F, T>(&self, key: K, task: F) -> Ticket<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|_| SequencerError::TaskPanicked);
            let _ = tx.send(outcome);
        });

        let mut lanes = self.lanes.lock();
        let job = match lanes.get(&key) {
            Some(lane) => match lane.send(job) {
                Ok(()) => return Ticket { rx },
                // worker is gone without deregistering (runtime shutdown)
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (lane_tx, lane_rx) = mpsc::unbounded_channel();
        let _ = lane_tx.send(job);
        lanes.insert(key.clone(), lane_tx);
        drop(lanes);

        tracing::trace!(?key, "lane opened");
        tokio::spawn(run_lane(Arc::clone(&self.lanes), key, lane_rx));
        Ticket { rx }
    }

    /// Run `task` with exclusive ownership of `key`'s lane and wait for it.
    pub async fn run_exclusive<F, T>(&self, key: K, task: F) -> Result<T, SequencerError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(key, task).await
    }

    /// Lanes with queued or running work.
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().len()
    }
}

async fn run_lane<K>(lanes: Lanes<K>, key: K, mut rx: mpsc::UnboundedReceiver<Job>)
where
    K: Eq + Hash + Debug,
{
    loop {
        let job = match rx.try_recv() {
            Ok(job) => job,
            Err(_) => {
                let mut lanes = lanes.lock();
                match rx.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        lanes.remove(&key);
                        tracing::trace!(?key, "lane drained");
                        return;
                    }
                }
            }
        };
        job.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_for_drain<K>(seq: &Sequencer<K>)
    where
        K: Eq + Hash + Clone + Debug + Send + 'static,
    {
        for _ in 0..100 {
            if seq.active_lanes() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("lanes never drained");
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_runs_fifo_and_never_overlaps() {
        let seq = Sequencer::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tickets: Vec<_> = (0..5u64)
            .map(|i| {
                let log = log.clone();
                let running = running.clone();
                let peak = peak.clone();
                seq.submit("lane", async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    // later tasks sleep less, so overlap would reorder the log
                    tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                    log.lock().push(i);
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        for (i, t) in tickets.into_iter().enumerate() {
            assert_eq!(t.await.unwrap(), i as u64);
        }
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_run_concurrently() {
        let seq = Sequencer::new();
        let start = tokio::time::Instant::now();
        let tickets: Vec<_> = (0..8)
            .map(|k| {
                seq.submit(k, async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                })
            })
            .collect();
        for t in tickets {
            t.await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn failing_task_reports_error_and_lane_continues() {
        let seq = Sequencer::new();
        let first = seq.submit(1, async { Err::<u32, &str>("boom") });
        let second = seq.submit(1, async { Ok::<u32, &str>(7) });
        assert_eq!(first.await.unwrap(), Err("boom"));
        assert_eq!(second.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn panicking_task_does_not_wedge_the_lane() {
        let seq = Sequencer::new();
        let first = seq.submit(1, async { None::<u32>.expect("task blew up") });
        let second = seq.submit(1, async { 42 });
        assert_eq!(first.await, Err(SequencerError::TaskPanicked));
        assert_eq!(second.await, Ok(42));
    }

    #[tokio::test]
    async fn lanes_are_removed_once_drained_and_reopened_on_demand() {
        let seq = Sequencer::new();
        seq.run_exclusive("a", async {}).await.unwrap();
        wait_for_drain(&seq).await;
        assert_eq!(seq.active_lanes(), 0);

        assert_eq!(seq.run_exclusive("a", async { 3 }).await, Ok(3));
        wait_for_drain(&seq).await;
    }

    #[tokio::test]
    async fn dropped_ticket_still_runs_the_task() {
        let seq = Sequencer::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        drop(seq.submit(1, async move {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        seq.run_exclusive(1, async {}).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
