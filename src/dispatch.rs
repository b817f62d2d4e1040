use crate::config::DispatchConfig;
use crate::error::{AgentError, Result};
use crate::executor::Job;
use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

enum DispatchMessage {
    Run(Job),
    Stop,
}

/// Worker thread that absorbs blocking state waits.
///
/// A proxy call that must block until the camera reaches a state, and then
/// post to the handler, runs here. Blocking the handler thread instead would
/// deadlock: only the handler can move the state forward.
#[derive(Clone)]
pub struct DispatchThread {
    sender: Sender<DispatchMessage>,
    capacity: usize,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DispatchThread {
    pub fn spawn(config: &DispatchConfig) -> Result<Self> {
        let (sender, receiver) = channel::bounded::<DispatchMessage>(config.queue_capacity);
        let name = config.thread_name.clone();

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!("Dispatch thread '{}' started", name);
            for message in receiver.iter() {
                match message {
                    DispatchMessage::Run(job) => job(),
                    DispatchMessage::Stop => break,
                }
            }
            debug!("Dispatch thread '{}' exiting", name);
        })?;

        Ok(Self {
            sender,
            capacity: config.queue_capacity,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    /// Queue `job` for asynchronous execution on the dispatch thread.
    pub fn run_job<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .try_send(DispatchMessage::Run(Box::new(job)))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    error!("Dispatch queue is full ({} pending jobs)", self.capacity);
                    AgentError::DispatchQueueFull {
                        capacity: self.capacity,
                    }
                }
                TrySendError::Disconnected(_) => AgentError::DispatchStopped,
            })
    }

    /// Queue `job` and wait for it to finish, for at most `timeout`.
    pub fn run_job_sync<F>(&self, job: F, timeout: Duration, description: &str) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        self.run_job(move || {
            job();
            let _ = done_tx.send(());
        })?;

        done_rx.recv_timeout(timeout).map_err(|_| {
            warn!("Timed out after {:?} waiting for {}", timeout, description);
            AgentError::Timeout {
                job: description.to_string(),
                timeout,
            }
        })
    }

    /// Stop accepting work once queued jobs have run, and join the thread.
    pub fn shutdown(&self) {
        let Some(join) = self.join.lock().take() else {
            return;
        };
        // Blocks while the queue is full; jobs still drain ahead of the stop
        if self.sender.send(DispatchMessage::Stop).is_err() {
            debug!("Dispatch thread already stopped");
        }
        if join.thread().id() == thread::current().id() {
            return;
        }
        if join.join().is_err() {
            error!("Dispatch thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::state::{CameraState, CameraStateHolder, StateSet};

    fn test_config(capacity: usize) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: capacity,
            ..AgentConfig::default().dispatch
        }
    }

    #[test]
    fn test_jobs_run_in_order_off_caller_thread() {
        let dispatch = DispatchThread::spawn(&test_config(16)).unwrap();
        let (tx, rx) = channel::unbounded();
        let caller = thread::current().id();

        for i in 0..4 {
            let tx = tx.clone();
            dispatch
                .run_job(move || tx.send((i, thread::current().id())).unwrap())
                .unwrap();
        }

        for expected in 0..4 {
            let (i, ran_on) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(i, expected);
            assert_ne!(ran_on, caller);
        }
        dispatch.shutdown();
    }

    #[test]
    fn test_blocking_job_does_not_block_caller() {
        let dispatch = DispatchThread::spawn(&test_config(16)).unwrap();
        let state = Arc::new(CameraStateHolder::default());
        let (tx, rx) = channel::unbounded();

        {
            let state = Arc::clone(&state);
            dispatch
                .run_job(move || {
                    let reached = state.wait_for_states(&StateSet::of(&[CameraState::Configured]));
                    tx.send(reached).unwrap();
                })
                .unwrap();
        }

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        state.set_state(CameraState::Configured);
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        dispatch.shutdown();
    }

    #[test]
    fn test_run_job_sync_times_out() {
        let dispatch = DispatchThread::spawn(&test_config(16)).unwrap();
        let result = dispatch.run_job_sync(
            || thread::sleep(Duration::from_millis(300)),
            Duration::from_millis(20),
            "slow job",
        );

        match result {
            Err(AgentError::Timeout { job, .. }) => assert_eq!(job, "slow job"),
            other => panic!("Expected timeout, got {:?}", other),
        }
        dispatch.shutdown();
    }

    #[test]
    fn test_full_queue_is_reported() {
        let dispatch = DispatchThread::spawn(&test_config(1)).unwrap();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let (started_tx, started_rx) = channel::bounded::<()>(1);

        dispatch
            .run_job(move || {
                started_tx.send(()).unwrap();
                let _ = gate_rx.recv();
            })
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // One job fits in the queue while the first is still running
        dispatch.run_job(|| {}).unwrap();
        assert!(matches!(
            dispatch.run_job(|| {}),
            Err(AgentError::DispatchQueueFull { capacity: 1 })
        ));

        gate_tx.send(()).unwrap();
        dispatch.shutdown();
        assert!(matches!(
            dispatch.run_job(|| {}),
            Err(AgentError::DispatchStopped)
        ));
    }
}
