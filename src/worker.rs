//! A single pool worker and its execution loop

use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Opaque task payload as submitted by a client.
pub type Task = String;

/// Pool-assigned worker identifier. Never reused within a pool.
///
/// Issued ids are positive; the signed range lets a client name any
/// integer, e.g. `del -1`, and get a plain "no such worker" answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub i64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Completion record sent to the operator, never to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub worker: WorkerId,
    pub task: Task,
    pub output: String,
}

/// A worker consuming from the shared task queue
pub struct Worker {
    id: WorkerId,
    tasks: flume::Receiver<Task>,
    cancel: CancellationToken,
    reports: mpsc::UnboundedSender<Report>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        tasks: flume::Receiver<Task>,
        cancel: CancellationToken,
        reports: mpsc::UnboundedSender<Report>,
    ) -> Self {
        Self {
            id,
            tasks,
            cancel,
            reports,
        }
    }

    /// Run until the cancellation token fires or the queue disconnects.
    ///
    /// Tasks are handled one at a time; cancellation is only observed
    /// between tasks.
    pub async fn run(self) {
        debug!(worker = %self.id, "Worker started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,
                received = self.tasks.recv_async() => match received {
                    Ok(task) => self.handle(task),
                    Err(flume::RecvError::Disconnected) => break,
                },
            }
        }

        info!(worker = %self.id, "Worker stopped");
    }

    fn handle(&self, task: Task) {
        let output = process_task(self.id, &task);
        debug!(worker = %self.id, task = %task, "Task processed");

        // Operator sink gone means the service is tearing down
        let _ = self.reports.send(Report {
            worker: self.id,
            task,
            output,
        });
    }
}

pub fn process_task(id: WorkerId, task: &str) -> String {
    format!("worker {} processed task: {}", id, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_process_task() {
        assert_eq!(
            process_task(WorkerId(3), "hello world"),
            "worker 3 processed task: hello world"
        );
    }

    #[tokio::test]
    async fn test_worker_reports_and_stops_on_cancel() {
        let (task_tx, task_rx) = flume::bounded(0);
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Worker::new(WorkerId(7), task_rx, cancel.clone(), report_tx).run());

        task_tx.send_async("hello".to_string()).await.unwrap();
        let report = report_rx.recv().await.unwrap();
        assert_eq!(report.worker, WorkerId(7));
        assert_eq!(report.output, "worker 7 processed task: hello");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_when_queue_disconnects() {
        let (task_tx, task_rx) = flume::bounded::<Task>(0);
        let (report_tx, _report_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(
            Worker::new(WorkerId(1), task_rx, CancellationToken::new(), report_tx).run(),
        );
        drop(task_tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not exit on closed queue")
            .unwrap();
    }
}
