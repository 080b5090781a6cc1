//! Tracked background tasks for process start/stop.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinSet;

use aclgate_core::error::{GatewayError, Result};

#[derive(Default)]
pub struct WorkerSet {
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` on the runtime; it will be awaited by [`join_all`](Self::join_all).
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| GatewayError::Internal("worker set lock poisoned".into()))?;
        // reap finished tasks so the set does not grow without bound
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
        tracing::debug!(worker = name, outstanding = tasks.len(), "worker spawned");
        Ok(())
    }

    /// Await every outstanding worker, including ones spawned while waiting.
    pub async fn join_all(&self) {
        loop {
            let mut batch = match self.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => {
                    tracing::error!("worker set lock poisoned, skipping join");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }
            while let Some(res) = batch.join_next().await {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "worker ended abnormally");
                }
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.lock().map_or(0, |t| t.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn join_all_waits_for_every_worker() {
        let workers = Arc::new(WorkerSet::new());
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..3u64 {
            let done = Arc::clone(&done);
            workers
                .spawn("test", async move {
                    tokio::time::sleep(Duration::from_millis(10 * i)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        workers.join_all().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(workers.outstanding(), 0);
    }
}
