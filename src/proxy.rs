use crate::callbacks::{
    forward_auto_focus, forward_auto_focus_move, forward_preview_started, ForwardingOpenCallback,
    OpenCallback,
};
use crate::dispatch::DispatchThread;
use crate::error::{AgentError, Result};
use crate::executor::CallbackExecutor;
use crate::handler::{CameraAction, HandlerHandle};
use crate::settings::CameraSettings;
use crate::state::{CameraState, CameraStateHolder, StateSet};
use crate::subsystem::CameraCharacteristics;
use crate::surface::PreviewTexture;
use crossbeam::channel;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Handles shared by the agent, its proxies and the handler.
#[derive(Clone)]
pub(crate) struct AgentCore {
    pub(crate) handler: HandlerHandle,
    pub(crate) dispatch: DispatchThread,
    pub(crate) state: Arc<CameraStateHolder>,
    pub(crate) job_timeout: Duration,
}

impl AgentCore {
    /// Queue a job that posts `action` once the camera reaches `states`.
    ///
    /// Every proxy operation goes through the dispatch thread, so operations
    /// reach the handler in the order the caller issued them.
    pub(crate) fn post_when<F>(&self, states: Option<StateSet>, make_action: F) -> Result<()>
    where
        F: FnOnce() -> CameraAction + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let handler = self.handler.clone();
        self.dispatch.run_job(move || {
            if let Some(states) = states {
                if !state.wait_for_states(&states) {
                    debug!("Camera state invalidated while waiting for {}", states);
                    return;
                }
            }
            if let Err(e) = handler.post(make_action()) {
                warn!("Failed to post camera action: {}", e);
            }
        })
    }
}

/// Handle to an opened camera, given to callers through
/// [`OpenCallback::on_camera_opened`](crate::callbacks::OpenCallback::on_camera_opened).
///
/// Every method returns immediately. The work runs later on the handler
/// thread, in call order.
#[derive(Clone)]
pub struct CameraProxy {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    core: AgentCore,
    camera_index: usize,
    characteristics: CameraCharacteristics,
}

impl CameraProxy {
    pub(crate) fn new(
        core: AgentCore,
        camera_index: usize,
        characteristics: CameraCharacteristics,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                core,
                camera_index,
                characteristics,
            }),
        }
    }

    pub fn camera_index(&self) -> usize {
        self.inner.camera_index
    }

    pub fn characteristics(&self) -> &CameraCharacteristics {
        &self.inner.characteristics
    }

    pub fn camera_state(&self) -> CameraState {
        self.inner.core.state.state()
    }

    pub fn state_holder(&self) -> Arc<CameraStateHolder> {
        Arc::clone(&self.inner.core.state)
    }

    /// Merge `settings` into the camera's capture parameters.
    ///
    /// Returns `false` without queueing anything when the settings are
    /// invalid or the dispatch queue rejects the job.
    pub fn apply_settings(&self, settings: &CameraSettings) -> bool {
        if let Err(e) = settings.validate() {
            warn!("Rejecting camera settings: {}", e);
            return false;
        }
        let settings = settings.clone();
        let opened = StateSet::at_least(CameraState::Unconfigured);
        match self
            .inner
            .core
            .post_when(Some(opened), move || CameraAction::ApplySettings(settings))
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to queue camera settings: {}", e);
                false
            }
        }
    }

    /// The settings most recently applied, read back from the handler.
    /// Blocks the calling thread; never call it from a camera callback
    /// executor that the handler is waiting on.
    pub fn settings(&self) -> Result<Option<CameraSettings>> {
        let (tx, rx) = channel::bounded(1);
        self.inner
            .core
            .post_when(None, move || CameraAction::QuerySettings(tx))?;
        let timeout = self.inner.core.job_timeout;
        rx.recv_timeout(timeout).map_err(|_| AgentError::Timeout {
            job: "camera settings".to_string(),
            timeout,
        })
    }

    pub fn set_preview_texture(&self, texture: Arc<PreviewTexture>) -> Result<()> {
        self.inner
            .core
            .post_when(None, move || CameraAction::SetPreviewTexture(texture))
    }

    /// Start streaming into the preview texture. `callback` fires once the
    /// first frame is flowing.
    pub fn start_preview<F>(
        &self,
        executor: Arc<dyn CallbackExecutor>,
        callback: Option<F>,
    ) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let forward = callback.map(|cb| forward_preview_started(executor, cb));
        let ready = StateSet::at_least(CameraState::PreviewReady);
        self.inner
            .core
            .post_when(Some(ready), move || CameraAction::StartPreview(forward))
    }

    pub fn stop_preview(&self) -> Result<()> {
        self.inner
            .core
            .post_when(None, || CameraAction::StopPreview)
    }

    /// Lock focus. Waits (off the caller's thread) for an active preview,
    /// then triggers a scan; `callback` reports whether the locked lens is in
    /// focus.
    pub fn auto_focus<F>(&self, executor: Arc<dyn CallbackExecutor>, callback: Option<F>) -> Result<()>
    where
        F: FnOnce(bool, CameraProxy) + Send + 'static,
    {
        let forward = callback.map(|cb| forward_auto_focus(executor, cb));
        let previewing = StateSet::of(&[CameraState::PreviewActive, CameraState::FocusLocked]);
        self.inner
            .core
            .post_when(Some(previewing), move || CameraAction::AutoFocus(forward))
    }

    pub fn cancel_auto_focus(&self) -> Result<()> {
        self.inner
            .core
            .post_when(None, || CameraAction::CancelAutoFocus)
    }

    /// Replace the passive focus movement callback; `None` removes it.
    pub fn set_auto_focus_move_callback<F>(
        &self,
        executor: Arc<dyn CallbackExecutor>,
        callback: Option<F>,
    ) -> Result<()>
    where
        F: Fn(bool, CameraProxy) + Send + Sync + 'static,
    {
        let forward = callback.map(|cb| forward_auto_focus_move(executor, cb));
        self.inner
            .core
            .post_when(None, move || CameraAction::SetAutoFocusMoveCallback(forward))
    }

    /// Ask to reopen this camera. Reports `on_device_opened_already` while
    /// the camera is still open.
    pub fn reconnect(
        &self,
        executor: Arc<dyn CallbackExecutor>,
        callback: Arc<dyn OpenCallback>,
    ) -> Result<()> {
        let index = self.inner.camera_index;
        let callback = ForwardingOpenCallback::wrap(executor, callback);
        self.inner
            .core
            .post_when(None, move || CameraAction::Reconnect { index, callback })
    }

    /// Release the camera asynchronously.
    pub fn release(&self) -> Result<()> {
        self.inner.core.post_when(None, || CameraAction::Release)
    }
}

impl fmt::Debug for CameraProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraProxy")
            .field("camera_index", &self.inner.camera_index)
            .field("characteristics", &self.inner.characteristics)
            .finish()
    }
}
