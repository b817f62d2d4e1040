//! The camera handler: one thread, one queue, all session state.
//!
//! Actions from the proxy and notifications from the camera subsystem share
//! a single FIFO queue and are processed one at a time. The session context
//! lives inside [`Camera2Handler`] and is never reachable from another
//! thread; only the [`CameraState`](crate::state::CameraState) is shared.

mod actions;
mod hardware;
mod history;
mod session;
mod stats;

pub use actions::{ActionKind, CameraAction};
pub use stats::{HandlerStats, HandlerStatsSnapshot};

use crate::callbacks::{
    AutoFocusCallback, AutoFocusMoveCallback, ExceptionRouter, OpenCallback,
    PreviewStartedCallback,
};
use crate::error::{AgentError, Result};
use crate::proxy::{AgentCore, CameraProxy};
use crate::registry::CameraRegistry;
use crate::request::{CaptureRequestBuilder, Rect, Size};
use crate::settings::CameraSettings;
use crate::state::{CameraState, CameraStateHolder};
use crate::subsystem::{
    AfState, CameraDevice, CameraSubsystem, CaptureSession, EventSink, HardwareEvent,
};
use crate::surface::{PreviewTexture, Surface};
use crossbeam::channel::{self, Receiver, Sender};
use history::MessageHistory;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub(crate) enum HandlerMessage {
    Action(CameraAction),
    Hardware(HardwareEvent),
    /// Acknowledged once every earlier message has been processed.
    Barrier(Sender<()>),
    Shutdown,
}

/// Posting side of the handler queue.
#[derive(Clone)]
pub(crate) struct HandlerHandle {
    sender: Sender<HandlerMessage>,
}

impl HandlerHandle {
    pub(crate) fn channel() -> (Self, Receiver<HandlerMessage>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }

    pub(crate) fn post(&self, action: CameraAction) -> Result<()> {
        self.sender
            .send(HandlerMessage::Action(action))
            .map_err(|_| AgentError::HandlerStopped)
    }

    /// Returns a receiver that fires once the handler has drained every
    /// message posted before this call.
    pub(crate) fn barrier(&self) -> Result<Receiver<()>> {
        let (tx, rx) = channel::bounded(1);
        self.sender
            .send(HandlerMessage::Barrier(tx))
            .map_err(|_| AgentError::HandlerStopped)?;
        Ok(rx)
    }

    pub(crate) fn shutdown(&self) {
        if self.sender.send(HandlerMessage::Shutdown).is_err() {
            debug!("Camera handler already stopped");
        }
    }

    pub(crate) fn event_sink(&self) -> EventSink {
        EventSink::new(self.sender.clone())
    }
}

/// Everything the handler knows about the current camera session.
#[derive(Default)]
struct SessionContext {
    // Caller-provided when leaving the unopened state
    open_callback: Option<Arc<dyn OpenCallback>>,
    camera_index: usize,
    camera_id: Option<String>,

    // Available in the unconfigured state and above
    device: Option<Box<dyn CameraDevice>>,
    proxy: Option<CameraProxy>,
    persistent_request: Option<CaptureRequestBuilder>,
    active_array: Option<Rect>,

    // Available in the configured state and above
    settings: Option<CameraSettings>,
    preview_size: Option<Size>,

    // Available in the preview-ready state and above
    preview_texture: Option<Arc<PreviewTexture>>,
    preview_surface: Option<Surface>,
    session: Option<Box<dyn CaptureSession>>,

    // From a start-preview request until the first frame flows
    oneshot_preview_callback: Option<PreviewStartedCallback>,
    // Between an autofocus request and its trigger capture completing
    pending_af_trigger: Option<AutoFocusCallback>,
    // After the trigger capture completes, until the lens settles
    oneshot_af_callback: Option<AutoFocusCallback>,
    passive_af_callback: Option<AutoFocusMoveCallback>,
}

pub(crate) struct Camera2Handler {
    subsystem: Arc<dyn CameraSubsystem>,
    registry: Arc<Mutex<CameraRegistry>>,
    core: AgentCore,
    exceptions: Arc<ExceptionRouter>,
    stats: Arc<HandlerStats>,
    history: MessageHistory,
    ctx: SessionContext,
    last_af_state: Option<AfState>,
}

impl Camera2Handler {
    pub(crate) fn new(
        subsystem: Arc<dyn CameraSubsystem>,
        registry: Arc<Mutex<CameraRegistry>>,
        core: AgentCore,
        exceptions: Arc<ExceptionRouter>,
        stats: Arc<HandlerStats>,
        history_size: usize,
    ) -> Self {
        Self {
            subsystem,
            registry,
            core,
            exceptions,
            stats,
            history: MessageHistory::new(history_size),
            ctx: SessionContext::default(),
            last_af_state: None,
        }
    }

    /// Run the handler loop on a dedicated thread until a shutdown message
    /// arrives or every sender is gone.
    pub(crate) fn spawn(
        mut self,
        receiver: Receiver<HandlerMessage>,
        thread_name: &str,
    ) -> Result<JoinHandle<()>> {
        let name = thread_name.to_string();
        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            let _invalidate = InvalidateOnExit(Arc::clone(&self.core.state));
            info!("Camera handler thread '{}' started", name);
            for message in receiver.iter() {
                if !self.handle_message(message) {
                    break;
                }
            }
            info!("Camera handler thread '{}' exiting", name);
        })?;
        Ok(join)
    }

    fn state(&self) -> CameraState {
        self.core.state.state()
    }

    fn set_state(&self, state: CameraState) {
        self.core.state.set_state(state);
    }

    /// Process one message. Returns `false` when the loop should stop.
    pub(crate) fn handle_message(&mut self, message: HandlerMessage) -> bool {
        match message {
            HandlerMessage::Action(action) => self.handle_action(action),
            HandlerMessage::Hardware(event) => {
                self.stats.record_hardware_event();
                self.handle_hardware_event(event);
            }
            HandlerMessage::Barrier(done) => {
                let _ = done.send(());
            }
            HandlerMessage::Shutdown => {
                if self.state() != CameraState::Unopened {
                    self.release();
                }
                return false;
            }
        }
        true
    }

    fn handle_action(&mut self, action: CameraAction) {
        let kind = action.kind();
        debug!("Handling camera action {:?} in state {}", action, self.state());
        self.history.record(kind);
        self.stats.record_action();

        if let Err(err) = self.process_action(action) {
            self.stats.record_failure();
            self.recover_from_failure(kind, err);
        }
    }

    fn process_action(&mut self, action: CameraAction) -> Result<()> {
        match action {
            CameraAction::OpenCamera { index, callback }
            | CameraAction::Reconnect { index, callback } => self.open_camera(index, callback),
            CameraAction::Release => {
                self.release();
                Ok(())
            }
            CameraAction::SetPreviewTexture(texture) => self.set_preview_texture(texture),
            CameraAction::StartPreview(callback) => self.start_preview(callback),
            CameraAction::StopPreview => self.stop_preview(),
            CameraAction::ApplySettings(settings) => self.apply_to_request(settings),
            CameraAction::AutoFocus(callback) => self.auto_focus(callback),
            CameraAction::CancelAutoFocus => self.cancel_auto_focus(),
            CameraAction::SetAutoFocusMoveCallback(callback) => {
                self.ctx.passive_af_callback = callback;
                Ok(())
            }
            CameraAction::QuerySettings(reply) => {
                let _ = reply.send(self.ctx.settings.clone());
                Ok(())
            }
            unsupported => Err(AgentError::UnsupportedAction {
                action: unsupported.kind(),
            }),
        }
    }

    fn recover_from_failure(&mut self, kind: ActionKind, err: AgentError) {
        error!("Camera handler failed to process {}: {}", kind, err);

        if kind != ActionKind::Release && self.ctx.device.is_some() {
            if let Some(mut device) = self.ctx.device.take() {
                warn!("Closing camera device {} after failure", device.id());
                device.close();
            }
        } else if self.ctx.device.is_none() {
            if kind.is_open() {
                if let Some(callback) = &self.ctx.open_callback {
                    callback.on_device_open_failure(
                        self.ctx.camera_index,
                        self.history.describe(self.ctx.camera_index),
                    );
                }
            } else {
                warn!("Cannot handle {}, no camera device is open", kind);
            }
        }

        if err.is_fatal() {
            self.exceptions.raise(err);
        }
    }

    fn reject(&self, reason: &str) {
        warn!("{} (state: {})", reason, self.state());
        self.stats.record_rejected();
    }
}

/// Wakes blocked waiters forever once the handler thread is gone, even when
/// it unwinds from a fatal error.
struct InvalidateOnExit(Arc<CameraStateHolder>);

impl Drop for InvalidateOnExit {
    fn drop(&mut self) {
        self.0.invalidate();
    }
}
