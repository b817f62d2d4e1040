//! Entry point for callers: owns the handler and dispatch threads.

use crate::callbacks::{ExceptionRouter, ForwardingOpenCallback, OpenCallback};
use crate::config::AgentConfig;
use crate::dispatch::DispatchThread;
use crate::error::{AgentError, Result};
use crate::executor::CallbackExecutor;
use crate::handler::{Camera2Handler, CameraAction, HandlerHandle, HandlerStats, HandlerStatsSnapshot};
use crate::proxy::{AgentCore, CameraProxy};
use crate::registry::{CameraDeviceInfo, CameraRegistry};
use crate::state::{CameraState, CameraStateHolder};
use crate::subsystem::CameraSubsystem;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Camera agent over one [`CameraSubsystem`]. At most one camera is open at
/// a time.
pub struct CameraAgent {
    subsystem: Arc<dyn CameraSubsystem>,
    registry: Arc<Mutex<CameraRegistry>>,
    core: AgentCore,
    exceptions: Arc<ExceptionRouter>,
    stats: Arc<HandlerStats>,
    handler_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CameraAgent {
    pub fn new(subsystem: Arc<dyn CameraSubsystem>, config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let dispatch = DispatchThread::spawn(&config.dispatch)?;
        let (handler, receiver) = HandlerHandle::channel();
        let core = AgentCore {
            handler,
            dispatch,
            state: Arc::new(CameraStateHolder::default()),
            job_timeout: config.dispatch.job_timeout(),
        };

        let registry = Arc::new(Mutex::new(CameraRegistry::new()));
        match subsystem.list_device_ids() {
            Ok(ids) => registry.lock().update(&ids),
            Err(e) => warn!("Couldn't list camera devices: {}", e),
        }

        let exceptions = Arc::new(ExceptionRouter::default());
        let stats = Arc::new(HandlerStats::default());
        let camera_handler = Camera2Handler::new(
            Arc::clone(&subsystem),
            Arc::clone(&registry),
            core.clone(),
            Arc::clone(&exceptions),
            Arc::clone(&stats),
            config.handler.history_size,
        );
        let join = match camera_handler.spawn(receiver, &config.handler.thread_name) {
            Ok(join) => join,
            Err(e) => {
                core.dispatch.shutdown();
                return Err(e);
            }
        };

        info!(
            "Camera agent started with {} camera(s)",
            registry.lock().live_count()
        );
        Ok(Self {
            subsystem,
            registry,
            core,
            exceptions,
            stats,
            handler_thread: Mutex::new(Some(join)),
        })
    }

    /// Refresh the device registry and describe every known camera.
    pub fn camera_device_info(&self) -> Result<CameraDeviceInfo> {
        let ids = self.subsystem.list_device_ids()?;
        let mut registry = self.registry.lock();
        registry.update(&ids);
        Ok(CameraDeviceInfo::snapshot(&registry, self.subsystem.as_ref()))
    }

    /// Open the camera at `index`. The outcome is reported to `callback` on
    /// `executor`.
    pub fn open_camera(
        &self,
        executor: Arc<dyn CallbackExecutor>,
        index: usize,
        callback: Arc<dyn OpenCallback>,
    ) -> Result<()> {
        let callback = ForwardingOpenCallback::wrap(executor, callback);
        self.core
            .post_when(None, move || CameraAction::OpenCamera { index, callback })
    }

    /// Release the open camera. With `synced`, returns only once the handler
    /// has processed the release, or fails after the configured job timeout.
    pub fn close_camera(&self, camera: Option<&CameraProxy>, synced: bool) -> Result<()> {
        if let Some(camera) = camera {
            debug!("Closing camera {}", camera.camera_index());
        }
        if !synced {
            return self.core.post_when(None, || CameraAction::Release);
        }

        let handler = self.core.handler.clone();
        let timeout = self.core.job_timeout;
        self.core.dispatch.run_job_sync(
            move || {
                if let Err(e) = handler.post(CameraAction::Release) {
                    warn!("Failed to post camera release: {}", e);
                    return;
                }
                match handler.barrier() {
                    Ok(done) => {
                        if done.recv_timeout(timeout).is_err() {
                            warn!("Camera handler did not finish the release in time");
                        }
                    }
                    Err(e) => warn!("Failed to wait for camera release: {}", e),
                }
            },
            timeout,
            "camera release",
        )
    }

    /// Install the destination for fatal handler errors.
    pub fn set_camera_exception_callback<F>(&self, executor: Arc<dyn CallbackExecutor>, callback: F)
    where
        F: Fn(Arc<AgentError>) + Send + Sync + 'static,
    {
        self.exceptions.set(executor, Arc::new(callback));
    }

    /// Queue a raw action behind everything already queued.
    pub fn dispatch_action(&self, action: CameraAction) -> Result<()> {
        self.core.post_when(None, move || action)
    }

    pub fn camera_state(&self) -> CameraState {
        self.core.state.state()
    }

    pub fn state_holder(&self) -> Arc<CameraStateHolder> {
        Arc::clone(&self.core.state)
    }

    pub fn stats(&self) -> HandlerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Release the camera and stop both worker threads. Safe to call more
    /// than once; later calls do nothing.
    pub fn recycle(&self) {
        let Some(join) = self.handler_thread.lock().take() else {
            return;
        };
        info!("Recycling camera agent");

        // The handler releases an open camera before it exits
        self.core.handler.shutdown();
        if join.thread().id() != thread::current().id() && join.join().is_err() {
            error!("Camera handler thread terminated with a panic");
        }

        // Jobs still waiting on a state give up and drain
        self.core.state.invalidate();
        self.core.dispatch.shutdown();
    }
}

impl Drop for CameraAgent {
    fn drop(&mut self) {
        self.recycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::testing::{ChannelOpenCallback, OpenEvent};
    use crate::executor::ThreadExecutor;
    use crate::request::Size;
    use crate::settings::{CameraSettings, FocusMode};
    use crate::sim::{SimCall, SimulatedSubsystem};
    use crate::state::StateSet;
    use crate::subsystem::AfState;
    use crate::surface::PreviewTexture;
    use crossbeam::channel::{self, Receiver};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_agent(ids: &[&str]) -> (CameraAgent, SimulatedSubsystem, Arc<ThreadExecutor>) {
        let sim = SimulatedSubsystem::new(ids);
        let agent = CameraAgent::new(Arc::new(sim.clone()), AgentConfig::default()).unwrap();
        let executor = ThreadExecutor::spawn("test-agent-callbacks").unwrap();
        (agent, sim, executor)
    }

    fn open(agent: &CameraAgent, executor: &Arc<ThreadExecutor>, index: usize) -> Receiver<OpenEvent> {
        let (callback, events) = ChannelOpenCallback::new();
        agent.open_camera(executor.clone(), index, callback).unwrap();
        events
    }

    fn expect_opened(events: &Receiver<OpenEvent>) -> CameraProxy {
        match events.recv_timeout(WAIT).unwrap() {
            OpenEvent::Opened(camera) => camera,
            _ => panic!("Expected the camera to open"),
        }
    }

    fn wait_for(agent: &CameraAgent, state: CameraState) {
        let holder = agent.state_holder();
        let (tx, rx) = channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(holder.wait_for_states(&StateSet::of(&[state])));
        });
        assert!(rx.recv_timeout(WAIT).unwrap(), "never reached {}", state);
    }

    fn settings() -> CameraSettings {
        let mut settings = CameraSettings::new(Size::new(1920, 1080), Size::new(4000, 3000));
        settings.focus_mode = FocusMode::Auto;
        settings
    }

    #[test]
    fn test_open_delivers_proxy_on_executor() {
        let (agent, _sim, executor) = test_agent(&["back", "front"]);
        let events = open(&agent, &executor, 1);

        let camera = expect_opened(&events);
        assert_eq!(camera.camera_index(), 1);
        assert!(camera.characteristics().is_facing_front());
        assert_eq!(agent.camera_state(), CameraState::Unconfigured);
    }

    #[test]
    fn test_full_preview_and_autofocus_flow() {
        let (agent, sim, executor) = test_agent(&["back"]);
        let camera = expect_opened(&open(&agent, &executor, 0));

        assert!(camera.apply_settings(&settings()));
        let texture = PreviewTexture::new();
        camera.set_preview_texture(Arc::clone(&texture)).unwrap();

        let (started_tx, started_rx) = channel::bounded(1);
        camera
            .start_preview(executor.clone(), Some(move || {
                let _ = started_tx.send(());
            }))
            .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();
        wait_for(&agent, CameraState::PreviewActive);
        assert_eq!(texture.default_buffer_size(), Some(Size::new(1920, 1080)));

        sim.set_af_state(AfState::FocusedLocked);
        let (focus_tx, focus_rx) = channel::bounded(1);
        camera
            .auto_focus(executor.clone(), Some(move |focused: bool, _camera: CameraProxy| {
                let _ = focus_tx.send(focused);
            }))
            .unwrap();

        // Frames only report the lock once the trigger capture has completed
        let mut focused = None;
        for _ in 0..200 {
            sim.emit_frame();
            if let Ok(result) = focus_rx.recv_timeout(Duration::from_millis(10)) {
                focused = Some(result);
                break;
            }
        }
        assert_eq!(focused, Some(true));
        assert_eq!(agent.camera_state(), CameraState::FocusLocked);

        camera.cancel_auto_focus().unwrap();
        wait_for(&agent, CameraState::PreviewActive);

        agent.close_camera(Some(&camera), true).unwrap();
        assert_eq!(agent.camera_state(), CameraState::Unopened);
        assert!(sim
            .journal()
            .contains(&SimCall::CloseDevice("back".to_string())));
    }

    #[test]
    fn test_settings_read_back() {
        let (agent, _sim, executor) = test_agent(&["back"]);
        let camera = expect_opened(&open(&agent, &executor, 0));

        assert_eq!(camera.settings().unwrap(), None);
        assert!(camera.apply_settings(&settings()));
        assert_eq!(camera.settings().unwrap(), Some(settings()));
        assert_eq!(agent.camera_state(), CameraState::Configured);
    }

    #[test]
    fn test_invalid_settings_are_not_queued() {
        let (agent, _sim, executor) = test_agent(&["back"]);
        let camera = expect_opened(&open(&agent, &executor, 0));

        let mut invalid = settings();
        invalid.preview_size = Size::new(0, 0);
        assert!(!camera.apply_settings(&invalid));
        assert_eq!(camera.settings().unwrap(), None);
    }

    #[test]
    fn test_open_removed_device_reports_disabled() {
        let (agent, sim, executor) = test_agent(&["back", "front"]);
        sim.remove_device("back");

        let info = agent.camera_device_info().unwrap();
        assert_eq!(info.number_of_cameras(), 1);
        assert_eq!(info.first_front_camera(), Some(1));

        let events = open(&agent, &executor, 0);
        assert!(matches!(
            events.recv_timeout(WAIT).unwrap(),
            OpenEvent::Disabled(0)
        ));
        assert_eq!(agent.camera_state(), CameraState::Unopened);
    }

    #[test]
    fn test_second_open_reports_already_opened() {
        let (agent, _sim, executor) = test_agent(&["back"]);
        let _camera = expect_opened(&open(&agent, &executor, 0));

        let events = open(&agent, &executor, 0);
        match events.recv_timeout(WAIT).unwrap() {
            OpenEvent::AlreadyOpen(0, info) => assert!(info.contains("open_camera")),
            _ => panic!("Expected an already-opened report"),
        }
        assert_eq!(agent.stats().rejected_commands, 1);
    }

    #[test]
    fn test_unsupported_action_reaches_exception_callback() {
        let (agent, _sim, executor) = test_agent(&["back"]);
        let (tx, rx) = channel::bounded(1);
        agent.set_camera_exception_callback(executor.clone(), move |err: Arc<AgentError>| {
            let _ = tx.send(err.to_string());
        });

        agent.dispatch_action(CameraAction::CapturePhoto).unwrap();
        let message = rx.recv_timeout(WAIT).unwrap();
        assert!(message.contains("capture_photo"));
    }

    #[test]
    fn test_recycle_wakes_blocked_waiters() {
        let (agent, _sim, _executor) = test_agent(&["back"]);
        let holder = agent.state_holder();
        let (tx, rx) = channel::bounded(1);
        thread::spawn(move || {
            let reached = holder.wait_for_states(&StateSet::of(&[CameraState::PreviewActive]));
            let _ = tx.send(reached);
        });

        agent.recycle();
        assert!(!rx.recv_timeout(WAIT).unwrap());
        assert!(matches!(
            agent.dispatch_action(CameraAction::Release),
            Err(AgentError::DispatchStopped)
        ));
        agent.recycle();
    }

    #[test]
    fn test_drop_releases_open_camera() {
        let (agent, sim, executor) = test_agent(&["back"]);
        let _camera = expect_opened(&open(&agent, &executor, 0));

        drop(agent);
        assert!(sim
            .journal()
            .contains(&SimCall::CloseDevice("back".to_string())));
    }
}
