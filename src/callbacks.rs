//! Caller-facing callback types and their executor-forwarding wrappers.

use crate::error::AgentError;
use crate::executor::CallbackExecutor;
use crate::proxy::CameraProxy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::error;

/// Fired once, when the first preview frame is flowing.
pub type PreviewStartedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Fired once, when the lens settles after an autofocus trigger.
pub type AutoFocusCallback = Box<dyn FnOnce(bool, CameraProxy) + Send + 'static>;

/// Fired on every passive-focus transition while registered.
pub type AutoFocusMoveCallback = Arc<dyn Fn(bool, CameraProxy) + Send + Sync + 'static>;

/// Receives unrecoverable handler failures.
pub type ExceptionCallback = Arc<dyn Fn(Arc<AgentError>) + Send + Sync + 'static>;

/// Outcome notifications for an open request.
pub trait OpenCallback: Send + Sync {
    fn on_camera_opened(&self, camera: CameraProxy);

    /// The requested index refers to a device that has since disappeared.
    fn on_camera_disabled(&self, camera_index: usize);

    fn on_device_open_failure(&self, camera_index: usize, info: String);

    fn on_device_opened_already(&self, camera_index: usize, info: String);
}

/// Re-posts every notification onto the caller's executor.
pub struct ForwardingOpenCallback {
    executor: Arc<dyn CallbackExecutor>,
    inner: Arc<dyn OpenCallback>,
}

impl ForwardingOpenCallback {
    pub fn wrap(
        executor: Arc<dyn CallbackExecutor>,
        inner: Arc<dyn OpenCallback>,
    ) -> Arc<dyn OpenCallback> {
        Arc::new(Self { executor, inner })
    }
}

impl OpenCallback for ForwardingOpenCallback {
    fn on_camera_opened(&self, camera: CameraProxy) {
        let inner = Arc::clone(&self.inner);
        self.executor
            .execute(Box::new(move || inner.on_camera_opened(camera)));
    }

    fn on_camera_disabled(&self, camera_index: usize) {
        let inner = Arc::clone(&self.inner);
        self.executor
            .execute(Box::new(move || inner.on_camera_disabled(camera_index)));
    }

    fn on_device_open_failure(&self, camera_index: usize, info: String) {
        let inner = Arc::clone(&self.inner);
        self.executor
            .execute(Box::new(move || inner.on_device_open_failure(camera_index, info)));
    }

    fn on_device_opened_already(&self, camera_index: usize, info: String) {
        let inner = Arc::clone(&self.inner);
        self.executor
            .execute(Box::new(move || inner.on_device_opened_already(camera_index, info)));
    }
}

pub fn forward_preview_started<F>(
    executor: Arc<dyn CallbackExecutor>,
    callback: F,
) -> PreviewStartedCallback
where
    F: FnOnce() + Send + 'static,
{
    Box::new(move || executor.execute(Box::new(callback)))
}

pub fn forward_auto_focus<F>(executor: Arc<dyn CallbackExecutor>, callback: F) -> AutoFocusCallback
where
    F: FnOnce(bool, CameraProxy) + Send + 'static,
{
    Box::new(move |focused, camera| {
        executor.execute(Box::new(move || callback(focused, camera)));
    })
}

pub fn forward_auto_focus_move<F>(
    executor: Arc<dyn CallbackExecutor>,
    callback: F,
) -> AutoFocusMoveCallback
where
    F: Fn(bool, CameraProxy) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    Arc::new(move |moving, camera| {
        let callback = Arc::clone(&callback);
        executor.execute(Box::new(move || callback(moving, camera)));
    })
}

/// Process-wide destination for fatal handler errors.
///
/// Without an installed callback a fatal error panics on the handler
/// thread, which stops it for good.
#[derive(Default)]
pub(crate) struct ExceptionRouter {
    slot: Mutex<Option<(Arc<dyn CallbackExecutor>, ExceptionCallback)>>,
}

impl ExceptionRouter {
    pub(crate) fn set(&self, executor: Arc<dyn CallbackExecutor>, callback: ExceptionCallback) {
        *self.slot.lock() = Some((executor, callback));
    }

    pub(crate) fn raise(&self, err: AgentError) {
        let installed = self.slot.lock().clone();
        match installed {
            Some((executor, callback)) => {
                let err = Arc::new(err);
                executor.execute(Box::new(move || callback(err)));
            }
            None => {
                error!("No camera exception callback installed: {}", err);
                panic!("unrecoverable camera handler failure: {}", err);
            }
        }
    }
}

/// Open callback that reports every notification on a channel.
#[cfg(test)]
pub(crate) mod testing {
    use super::OpenCallback;
    use crate::proxy::CameraProxy;
    use crossbeam::channel::{self, Receiver, Sender};
    use std::sync::Arc;

    pub(crate) enum OpenEvent {
        Opened(CameraProxy),
        Disabled(usize),
        Failed(usize, String),
        AlreadyOpen(usize, String),
    }

    pub(crate) struct ChannelOpenCallback(Sender<OpenEvent>);

    impl ChannelOpenCallback {
        pub(crate) fn new() -> (Arc<dyn OpenCallback>, Receiver<OpenEvent>) {
            let (tx, rx) = channel::unbounded();
            (Arc::new(Self(tx)), rx)
        }
    }

    impl OpenCallback for ChannelOpenCallback {
        fn on_camera_opened(&self, camera: CameraProxy) {
            let _ = self.0.send(OpenEvent::Opened(camera));
        }

        fn on_camera_disabled(&self, camera_index: usize) {
            let _ = self.0.send(OpenEvent::Disabled(camera_index));
        }

        fn on_device_open_failure(&self, camera_index: usize, info: String) {
            let _ = self.0.send(OpenEvent::Failed(camera_index, info));
        }

        fn on_device_opened_already(&self, camera_index: usize, info: String) {
            let _ = self.0.send(OpenEvent::AlreadyOpen(camera_index, info));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadExecutor;
    use crate::handler::ActionKind;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_preview_callback_runs_on_executor() {
        let executor = ThreadExecutor::spawn("test-forward").unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();
        let caller = thread::current().id();

        let forwarded = forward_preview_started(executor, move || {
            tx.send(thread::current().id()).unwrap();
        });
        forwarded();

        let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_exception_router_delivers_to_installed_callback() {
        let router = ExceptionRouter::default();
        let executor = ThreadExecutor::spawn("test-exceptions").unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();

        router.set(
            executor,
            Arc::new(move |err: Arc<AgentError>| {
                tx.send(err.to_string()).unwrap();
            }),
        );
        router.raise(AgentError::UnsupportedAction {
            action: ActionKind::CapturePhoto,
        });

        let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(message.contains("capture_photo"));
    }

    #[test]
    #[should_panic(expected = "unrecoverable camera handler failure")]
    fn test_exception_router_panics_without_callback() {
        ExceptionRouter::default().raise(AgentError::UnsupportedAction {
            action: ActionKind::Lock,
        });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_reports_keep_order_on_tokio_executor() {
        use crate::executor::TokioExecutor;
        use crate::proxy::testing::detached_proxy;
        use std::sync::atomic::{AtomicBool, Ordering};

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let first = AtomicBool::new(true);
        let forwarded = forward_auto_focus_move(
            TokioExecutor::current(),
            move |moving: bool, _camera: CameraProxy| {
                // The first report is slow to deliver
                if first.swap(false, Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(100));
                }
                let _ = tx.send(moving);
            },
        );

        let camera = detached_proxy();
        forwarded(true, camera.clone());
        forwarded(false, camera);

        let mut delivered = Vec::new();
        for _ in 0..2 {
            let moving = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            delivered.push(moving);
        }
        assert_eq!(delivered, vec![true, false]);
    }
}
