// ─── Worker Pool ───
// Fixed set of tokio workers draining a shared queue. Every submitted task
// yields exactly one outcome, then the result stream closes.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of concurrent workers per batch.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Hard ceiling on workers, whatever the configuration says.
pub const MAX_WORKERS_CEILING: usize = 16;

/// What happened to one submitted task.
#[derive(Debug)]
pub enum TaskOutcome<R> {
    Completed(R),
    /// Never started, or aborted mid-flight, because the batch was cancelled or halted.
    Cancelled,
    Panicked(String),
}

impl<R> TaskOutcome<R> {
    pub fn completed(self) -> Option<R> {
        match self {
            TaskOutcome::Completed(r) => Some(r),
            _ => None,
        }
    }
}

/// Bounded fan-out executor shared by every batch operation.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    max_workers: usize,
    cancel: CancellationToken,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.clamp(1, MAX_WORKERS_CEILING),
            cancel: CancellationToken::new(),
        }
    }

    /// Tie every batch run by this pool to an external cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `task` over every input with at most `max_workers` in flight.
    ///
    /// Results arrive in completion order. Cancellation stops workers from
    /// starting queued tasks and drops in-flight ones; both still report
    /// `TaskOutcome::Cancelled`.
    pub fn run<T, R, F, Fut>(&self, inputs: Vec<T>, task: F) -> PoolResults<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = inputs.len();
        let workers = self.max_workers.min(total);
        debug!("Starting worker pool: {} tasks, {} workers", total, workers);

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        for input in inputs {
            // The receiver is alive until the queue is dropped below.
            let _ = job_tx.send(input);
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (out_tx, out_rx) = mpsc::channel(workers.max(1));
        let halt = self.cancel.child_token();
        let task = Arc::new(task);

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let out_tx = out_tx.clone();
            let task = Arc::clone(&task);
            let cancel = self.cancel.clone();
            let halt = halt.clone();

            tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(input) = next else { break };

                    let outcome = if halt.is_cancelled() {
                        TaskOutcome::Cancelled
                    } else {
                        let task = Arc::clone(&task);
                        let run = AssertUnwindSafe(async move { task(input).await }).catch_unwind();
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => TaskOutcome::Cancelled,
                            result = run => match result {
                                Ok(value) => TaskOutcome::Completed(value),
                                Err(payload) => {
                                    let message = panic_message(payload);
                                    warn!("Worker {} task panicked: {}", worker, message);
                                    TaskOutcome::Panicked(message)
                                }
                            },
                        }
                    };

                    if out_tx.send(outcome).await.is_err() {
                        // Consumer went away; nobody is left to report to.
                        break;
                    }
                }
            });
        }

        PoolResults {
            rx: out_rx,
            halt,
            total,
        }
    }
}

/// Unordered task outcomes; `recv` returns `None` once every worker has exited.
pub struct PoolResults<R> {
    rx: mpsc::Receiver<TaskOutcome<R>>,
    halt: CancellationToken,
    total: usize,
}

impl<R> PoolResults<R> {
    pub async fn recv(&mut self) -> Option<TaskOutcome<R>> {
        self.rx.recv().await
    }

    /// Stop starting queued tasks. In-flight tasks run to completion.
    pub fn halt(&self) {
        self.halt.cancel();
    }

    pub async fn collect_all(mut self) -> Vec<TaskOutcome<R>> {
        let mut outcomes = Vec::with_capacity(self.total);
        while let Some(outcome) = self.rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn every_batch_size_yields_one_outcome_per_task() {
        let pool = WorkerPool::new(4);

        for n in 0..=20usize {
            let inputs: Vec<usize> = (0..n).collect();
            let outcomes = pool
                .run(inputs, |i| async move {
                    // Reverse-ish completion order.
                    tokio::time::sleep(Duration::from_millis(((20 - i) % 5) as u64)).await;
                    i
                })
                .collect_all()
                .await;

            let mut values: Vec<usize> = outcomes
                .into_iter()
                .filter_map(TaskOutcome::completed)
                .collect();
            values.sort_unstable();
            assert_eq!(values, (0..n).collect::<Vec<_>>(), "batch size {n}");
        }
    }

    #[tokio::test]
    async fn empty_batch_closes_immediately() {
        let pool = WorkerPool::new(8);
        let results = pool.run(Vec::<u32>::new(), |i| async move { i });

        let outcomes = tokio::time::timeout(Duration::from_secs(1), results.collect_all())
            .await
            .expect("empty batch must not hang");
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_limit() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.run((0..12).collect(), move |_: u32| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect_all()
            .await
        };

        assert_eq!(outcomes.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn pool_size_is_clamped() {
        assert_eq!(WorkerPool::new(0).max_workers(), 1);
        assert_eq!(WorkerPool::new(500).max_workers(), MAX_WORKERS_CEILING);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_and_queued_tasks() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(2).with_cancellation(cancel.clone());

        let results = pool.run((0..6).collect(), |_: u32| std::future::pending::<()>());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let outcomes = tokio::time::timeout(Duration::from_secs(2), results.collect_all())
            .await
            .expect("cancelled batch must close");
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, TaskOutcome::Cancelled)));
    }

    #[tokio::test]
    async fn halt_lets_in_flight_finish_and_skips_queued() {
        let pool = WorkerPool::new(1);
        let mut results = pool.run((0..5).collect(), |i: u32| async move {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            i
        });

        let first = results.recv().await.unwrap();
        assert!(matches!(first, TaskOutcome::Completed(0)));
        results.halt();

        let rest = results.collect_all().await;
        assert_eq!(rest.len(), 4);
        let cancelled = rest
            .iter()
            .filter(|o| matches!(o, TaskOutcome::Cancelled))
            .count();
        assert!(cancelled >= 3);
    }

    #[tokio::test]
    async fn panicking_task_does_not_take_down_siblings() {
        let pool = WorkerPool::new(2);
        let outcomes = pool
            .run((0..4).collect(), |i: u32| async move {
                if i == 2 {
                    panic!("boom");
                }
                i
            })
            .collect_all()
            .await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, TaskOutcome::Panicked(m) if m == "boom"))
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, TaskOutcome::Completed(_)))
                .count(),
            3
        );
    }
}
