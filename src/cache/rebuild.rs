//! Bounded worker pool for background cache rebuilds.

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use std::sync::Arc;
use tracing::{debug, warn};

/// A queued rebuild task.
pub(crate) type RebuildTask = BoxFuture<'static, ()>;

/// Process-wide pool of rebuild workers with an explicit lifecycle:
/// constructed with the cache client, drained by [`shutdown`](Self::shutdown).
///
/// Submission never blocks the calling request thread; when the queue is
/// full the task is refused and the submitter decides what to give up
/// (typically the rebuild lock, so the next stale read retries).
pub(crate) struct RebuildPool {
    tx: mpsc::Sender<RebuildTask>,
    workers: Vec<JoinHandle<()>>,
}

impl RebuildPool {
    /// Start `workers` workers over a queue of `queue_depth` tasks.
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting for the
                        // next task, never while running one.
                        let task = { rx.lock().await.recv().await };
                        match task {
                            Some(task) => task.await,
                            None => break,
                        }
                    }
                    debug!(worker, "rebuild worker stopped");
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Try to enqueue a rebuild. Returns `false` if the queue is full or the
    /// pool is shut down; the task is dropped in that case.
    pub(crate) fn try_submit(&self, task: RebuildTask) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("rebuild queue full; task dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("rebuild pool shut down; task dropped");
                false
            }
        }
    }

    /// Close the queue and wait for in-flight rebuilds to finish.
    pub(crate) async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_submitted_tasks_run() {
        let pool = RebuildPool::new(2, 8);
        let ran = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let ran = ran.clone();
            assert!(pool.try_submit(Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            })));
        }

        pool.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_full_queue_refuses_without_blocking() {
        // One worker stuck on a slow task, queue of one.
        let pool = RebuildPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        assert!(pool.try_submit(Box::pin(async move {
            let _ = release_rx.await;
        })));
        // Give the worker time to pick up the blocking task.
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Queue slot taken by a second task, third must be refused.
        assert!(pool.try_submit(Box::pin(async {})));
        assert!(!pool.try_submit(Box::pin(async {})));

        let _ = release_tx.send(());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = RebuildPool::new(1, 8);
        let ran = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            pool.try_submit(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }
}
