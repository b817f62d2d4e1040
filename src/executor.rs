use crate::error::Result;
use crossbeam::channel::{self, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Execution context chosen by a caller for its callbacks.
///
/// The handler never runs user code itself: every user callback is wrapped
/// so that its body is handed to the caller's executor.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/// A looper-style thread that runs posted jobs one at a time, in order.
///
/// The thread exits once every clone of the executor has been dropped.
#[derive(Clone)]
pub struct ThreadExecutor {
    sender: Sender<Job>,
}

impl ThreadExecutor {
    pub fn spawn(name: &str) -> Result<Arc<Self>> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("Callback thread '{}' started", thread_name);
                for job in receiver.iter() {
                    job();
                }
                debug!("Callback thread '{}' exiting", thread_name);
            })?;

        Ok(Arc::new(Self { sender }))
    }
}

impl CallbackExecutor for ThreadExecutor {
    fn execute(&self, job: Job) {
        if self.sender.send(job).is_err() {
            warn!("Callback thread has exited, dropping callback");
        }
    }
}

/// Runs callbacks on a tokio runtime, one at a time and in posting order.
///
/// A single task drains the queue and hands each job to the blocking pool,
/// waiting for it to finish before starting the next.
#[derive(Clone)]
pub struct TokioExecutor {
    sender: mpsc::UnboundedSender<Job>,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Arc<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let runtime = handle.clone();
        handle.spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(e) = runtime.spawn_blocking(job).await {
                    warn!("Callback job did not complete: {}", e);
                }
            }
            debug!("Tokio callback queue closed");
        });
        Arc::new(Self { sender })
    }

    /// Use the runtime the caller is currently running on.
    pub fn current() -> Arc<Self> {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl CallbackExecutor for TokioExecutor {
    fn execute(&self, job: Job) {
        if self.sender.send(job).is_err() {
            warn!("Tokio callback queue has closed, dropping callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_thread_executor_runs_jobs_in_order_off_caller_thread() {
        let executor = ThreadExecutor::spawn("test-callbacks").unwrap();
        let (tx, rx) = channel::unbounded();
        let caller = thread::current().id();

        for i in 0..5 {
            let tx = tx.clone();
            executor.execute(Box::new(move || {
                tx.send((i, thread::current().id())).unwrap();
            }));
        }

        for expected in 0..5 {
            let (i, thread_id) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(i, expected);
            assert_ne!(thread_id, caller);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tokio_executor() {
        let executor = TokioExecutor::current();
        let (tx, rx) = tokio::sync::oneshot::channel();

        executor.execute(Box::new(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        }));

        let name = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(name.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tokio_executor_keeps_posting_order() {
        let executor = TokioExecutor::current();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let slow = tx.clone();
        executor.execute(Box::new(move || {
            thread::sleep(Duration::from_millis(100));
            let _ = slow.send("slow");
        }));
        executor.execute(Box::new(move || {
            let _ = tx.send("fast");
        }));

        let mut order = Vec::new();
        for _ in 0..2 {
            let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            order.push(next);
        }
        assert_eq!(order, vec!["slow", "fast"]);
    }
}
