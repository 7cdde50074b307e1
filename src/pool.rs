//! Dynamic worker pool with a shared rendezvous task queue
//!
//! The pool owns three things: the registry of live workers (id to
//! cancellation token), the next-id counter, and the sending half of the
//! shared queue. All three live behind one [`RwLock`] so registry mutations
//! are totally ordered. Task delivery itself is synchronized by the queue.
//!
//! The queue is a zero-capacity `flume` channel: a send completes only when
//! some worker takes the task. [`WorkerPool::submit_task`] checks the
//! registry and then sends, which are two steps; if the last worker is
//! deleted in between there is no consumer left. The send is therefore
//! bounded by `submit_timeout_ms` and reports [`PoolError::Timeout`].

use crate::config::Config;
use crate::error::PoolError;
use crate::worker::{Report, Task, Worker, WorkerId};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Pool-side control for one running worker
struct WorkerHandle {
    id: WorkerId,
    cancel: CancellationToken,
}

impl WorkerHandle {
    fn stop(self) -> WorkerId {
        self.cancel.cancel();
        self.id
    }
}

struct Registry {
    workers: BTreeMap<WorkerId, WorkerHandle>,
    next_id: i64,
    /// `None` once the queue is closed
    tasks: Option<flume::Sender<Task>>,
}

pub struct WorkerPool {
    registry: RwLock<Registry>,
    queue: flume::Receiver<Task>,
    reports: mpsc::UnboundedSender<Report>,
    tracker: TaskTracker,
    submit_timeout_ms: u64,
}

impl WorkerPool {
    /// Create an empty pool. Completed tasks are reported on `reports`.
    pub fn new(config: &Config, reports: mpsc::UnboundedSender<Report>) -> Self {
        let (tasks, queue) = flume::bounded(0);

        Self {
            registry: RwLock::new(Registry {
                workers: BTreeMap::new(),
                next_id: 1,
                tasks: Some(tasks),
            }),
            queue,
            reports,
            tracker: TaskTracker::new(),
            submit_timeout_ms: config.submit_timeout_ms,
        }
    }

    /// Start a new worker and return its id.
    ///
    /// Only fails once the queue has been closed, since a worker started
    /// then could never receive a task.
    pub async fn add_worker(&self) -> Result<WorkerId, PoolError> {
        let mut registry = self.registry.write().await;
        if registry.tasks.is_none() {
            return Err(PoolError::Closed);
        }

        let id = WorkerId(registry.next_id);
        registry.next_id += 1;

        let cancel = CancellationToken::new();
        registry.workers.insert(
            id,
            WorkerHandle {
                id,
                cancel: cancel.clone(),
            },
        );
        self.tracker
            .spawn(Worker::new(id, self.queue.clone(), cancel, self.reports.clone()).run());

        info!(worker = %id, active = registry.workers.len(), "Worker added");
        Ok(id)
    }

    /// Cancel and deregister worker `id`. Does not wait for it to exit.
    pub async fn delete_worker(&self, id: WorkerId) -> Result<(), PoolError> {
        let mut registry = self.registry.write().await;
        let handle = registry
            .workers
            .remove(&id)
            .ok_or(PoolError::NotFound(id))?;
        handle.stop();

        info!(worker = %id, active = registry.workers.len(), "Worker deleted");
        Ok(())
    }

    /// Cancel and deregister the worker with the smallest id.
    pub async fn delete_any_worker(&self) -> Result<WorkerId, PoolError> {
        let mut registry = self.registry.write().await;
        let (_, handle) = registry
            .workers
            .pop_first()
            .ok_or(PoolError::EmptyPool)?;
        let id = handle.stop();

        info!(worker = %id, active = registry.workers.len(), "Worker deleted");
        Ok(id)
    }

    /// Snapshot of the registry size. May be stale by the time it is used.
    pub async fn active_workers(&self) -> usize {
        self.registry.read().await.workers.len()
    }

    /// Hand `task` to exactly one idle worker.
    ///
    /// Rejected immediately when no worker is registered. Otherwise waits
    /// up to the submit timeout for a worker to take it.
    pub async fn submit_task(&self, task: Task) -> Result<(), PoolError> {
        let tasks = {
            let registry = self.registry.read().await;
            if registry.workers.is_empty() {
                return Err(PoolError::NoWorkers);
            }
            registry.tasks.clone().ok_or(PoolError::Closed)?
        };

        // The registry lock is released here; see module docs for the race.
        let bound = Duration::from_millis(self.submit_timeout_ms);
        match tokio::time::timeout(bound, tasks.send_async(task)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => {
                warn!(timeout_ms = self.submit_timeout_ms, "No worker accepted task");
                Err(PoolError::Timeout(self.submit_timeout_ms))
            }
        }
    }

    /// Close the shared queue. Idle workers exit once in-flight submissions
    /// finish, and later submissions are rejected.
    pub async fn close_queue(&self) {
        if self.registry.write().await.tasks.take().is_some() {
            debug!("Task queue closed");
        }
    }

    /// Cancel every worker, clear the registry and wait until all worker
    /// tasks have exited. Intended to be called once, at teardown.
    pub async fn shutdown(&self) {
        let mut registry = self.registry.write().await;

        let cancelled = registry.workers.len();
        for (_, handle) in std::mem::take(&mut registry.workers) {
            handle.stop();
        }
        registry.tasks = None;

        self.tracker.close();
        self.tracker.wait().await;

        info!(cancelled, "Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_pool(submit_timeout_ms: u64) -> (WorkerPool, mpsc::UnboundedReceiver<Report>) {
        let config = Config {
            submit_timeout_ms,
            ..Config::default()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        (WorkerPool::new(&config, tx), rx)
    }

    #[tokio::test]
    async fn test_ids_increase_and_are_never_reused() {
        let (pool, _reports) = test_pool(1000);

        assert_eq!(pool.add_worker().await.unwrap(), WorkerId(1));
        assert_eq!(pool.add_worker().await.unwrap(), WorkerId(2));
        pool.delete_worker(WorkerId(2)).await.unwrap();
        assert_eq!(pool.delete_any_worker().await.unwrap(), WorkerId(1));
        assert_eq!(pool.add_worker().await.unwrap(), WorkerId(3));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_count_tracks_adds_and_deletes() {
        let (pool, _reports) = test_pool(1000);

        for _ in 0..5 {
            pool.add_worker().await.unwrap();
        }
        pool.delete_worker(WorkerId(2)).await.unwrap();
        pool.delete_any_worker().await.unwrap();
        assert_eq!(pool.active_workers().await, 3);

        // Failed deletes leave the count alone
        assert_eq!(
            pool.delete_worker(WorkerId(2)).await,
            Err(PoolError::NotFound(WorkerId(2)))
        );
        assert_eq!(
            pool.delete_worker(WorkerId(42)).await,
            Err(PoolError::NotFound(WorkerId(42)))
        );
        assert_eq!(pool.active_workers().await, 3);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_any_picks_smallest_id() {
        let (pool, _reports) = test_pool(1000);

        for _ in 0..3 {
            pool.add_worker().await.unwrap();
        }
        pool.delete_worker(WorkerId(1)).await.unwrap();
        assert_eq!(pool.delete_any_worker().await.unwrap(), WorkerId(2));
        assert_eq!(pool.delete_any_worker().await.unwrap(), WorkerId(3));
        assert_eq!(pool.delete_any_worker().await, Err(PoolError::EmptyPool));
        assert_eq!(pool.active_workers().await, 0);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_without_workers_is_rejected() {
        let (pool, _reports) = test_pool(1000);
        assert_eq!(
            pool.submit_task("hello".to_string()).await,
            Err(PoolError::NoWorkers)
        );
    }

    #[tokio::test]
    async fn test_each_task_delivered_exactly_once() {
        let (pool, mut reports) = test_pool(5000);
        for _ in 0..3 {
            pool.add_worker().await.unwrap();
        }

        for i in 0..30 {
            pool.submit_task(format!("task-{i}")).await.unwrap();
        }

        let mut seen = HashSet::new();
        for _ in 0..30 {
            let report = reports.recv().await.unwrap();
            assert_eq!(
                report.output,
                format!("worker {} processed task: {}", report.worker, report.task)
            );
            assert!(seen.insert(report.task), "task delivered twice");
        }

        pool.shutdown().await;
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_mutations_keep_count_consistent() {
        let (pool, _reports) = test_pool(1000);
        let pool = std::sync::Arc::new(pool);

        let adds: Vec<_> = (0..20)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.add_worker().await.unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for add in adds {
            ids.push(add.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);

        let deletes: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.delete_any_worker().await })
            })
            .collect();
        for delete in deletes {
            assert!(delete.await.unwrap().is_ok());
        }
        assert_eq!(pool.active_workers().await, 12);

        pool.shutdown().await;
    }

    // A registered worker that is no longer receiving: the window between
    // the emptiness check and the send. The bounded send surfaces it.
    #[tokio::test]
    async fn test_submit_times_out_without_live_consumer() {
        let (pool, _reports) = test_pool(50);
        let id = pool.add_worker().await.unwrap();

        pool.registry.read().await.workers[&id].cancel.cancel();
        while !pool.tracker.is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(pool.active_workers().await, 1);
        assert_eq!(
            pool.submit_task("stranded".to_string()).await,
            Err(PoolError::Timeout(50))
        );

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_work() {
        let (pool, _reports) = test_pool(1000);
        pool.add_worker().await.unwrap();

        pool.close_queue().await;
        assert_eq!(
            pool.submit_task("late".to_string()).await,
            Err(PoolError::Closed)
        );
        assert_eq!(pool.add_worker().await, Err(PoolError::Closed));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let (pool, _reports) = test_pool(1000);
        for _ in 0..4 {
            pool.add_worker().await.unwrap();
        }

        pool.shutdown().await;

        assert_eq!(pool.active_workers().await, 0);
        assert!(pool.tracker.is_empty());
        assert!(pool.submit_task("after".to_string()).await.is_err());
    }
}
