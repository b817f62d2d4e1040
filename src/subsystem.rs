//! The camera subsystem contract consumed by the handler.
//!
//! Implementations report everything asynchronous through an [`EventSink`].
//! Events land on the handler thread's queue, so they are processed strictly
//! after the message that caused them and never concurrently with one.

use crate::error::SubsystemError;
use crate::handler::HandlerMessage;
use crate::request::{CaptureRequest, CaptureRequestBuilder, Rect, RequestTemplate};
use crate::surface::Surface;
use crossbeam::channel::Sender;
use serde::Serialize;
use std::fmt;
use tracing::debug;

pub type SubsystemResult<T> = std::result::Result<T, SubsystemError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LensFacing {
    Back,
    Front,
    External,
}

/// Fixed, per-device properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraCharacteristics {
    pub lens_facing: LensFacing,
    pub sensor_orientation: u32,
    pub active_array: Rect,
}

impl CameraCharacteristics {
    pub fn is_facing_back(&self) -> bool {
        self.lens_facing == LensFacing::Back
    }

    pub fn is_facing_front(&self) -> bool {
        self.lens_facing == LensFacing::Front
    }

    /// Shutter sound control is not offered by this pipeline.
    pub fn can_disable_shutter_sound(&self) -> bool {
        false
    }
}

/// Entry point of the camera subsystem.
pub trait CameraSubsystem: Send + Sync {
    fn list_device_ids(&self) -> SubsystemResult<Vec<String>>;

    fn characteristics(&self, id: &str) -> SubsystemResult<CameraCharacteristics>;

    /// Request that a device be opened. The outcome arrives later as a
    /// [`DeviceEvent`] on `events`, which the device keeps for all of its
    /// own notifications.
    fn open_device(&self, id: &str, events: EventSink) -> SubsystemResult<()>;
}

/// An opened device.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    fn create_request_builder(
        &mut self,
        template: RequestTemplate,
    ) -> SubsystemResult<CaptureRequestBuilder>;

    /// Request a capture session streaming to `surfaces`; completion arrives
    /// as a [`SessionEvent`].
    fn create_session(&mut self, surfaces: Vec<Surface>) -> SubsystemResult<()>;

    fn close(&mut self);
}

/// A configured capture session.
pub trait CaptureSession: Send {
    fn set_repeating_request(
        &mut self,
        request: CaptureRequest,
        listener: CaptureListener,
    ) -> SubsystemResult<()>;

    fn stop_repeating(&mut self) -> SubsystemResult<()>;

    fn capture(&mut self, request: CaptureRequest, listener: CaptureListener)
        -> SubsystemResult<()>;

    fn abort_captures(&mut self) -> SubsystemResult<()>;
}

/// Tag attached to a submitted request and echoed back with its results,
/// so the handler knows which adapter a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureListener {
    /// Repeating preview requests; tracks the autofocus state.
    FocusState,
    /// The one-shot capture that triggers an autofocus scan.
    AutoFocusTrigger,
    /// Results nobody is interested in.
    Untracked,
}

/// Autofocus state reported in capture results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

impl AfState {
    pub fn is_passive(self) -> bool {
        matches!(
            self,
            AfState::PassiveScan | AfState::PassiveFocused | AfState::PassiveUnfocused
        )
    }

    pub fn is_locked(self) -> bool {
        matches!(self, AfState::FocusedLocked | AfState::NotFocusedLocked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub frame_number: u64,
    pub af_state: Option<AfState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Error,
    Flushed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    pub frame_number: u64,
    pub reason: FailureReason,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Error => f.write_str("error"),
            FailureReason::Flushed => f.write_str("flushed"),
        }
    }
}

pub enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(i32),
}

pub enum SessionEvent {
    Configured(Box<dyn CaptureSession>),
    ConfigureFailed,
    /// The session started processing requests.
    Active,
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Completed(CaptureResult),
    Failed(CaptureFailure),
}

pub enum HardwareEvent {
    Device(DeviceEvent),
    Session(SessionEvent),
    Capture {
        listener: CaptureListener,
        event: CaptureEvent,
    },
}

impl HardwareEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HardwareEvent::Device(DeviceEvent::Opened(_)) => "device_opened",
            HardwareEvent::Device(DeviceEvent::Disconnected) => "device_disconnected",
            HardwareEvent::Device(DeviceEvent::Error(_)) => "device_error",
            HardwareEvent::Session(SessionEvent::Configured(_)) => "session_configured",
            HardwareEvent::Session(SessionEvent::ConfigureFailed) => "session_configure_failed",
            HardwareEvent::Session(SessionEvent::Active) => "session_active",
            HardwareEvent::Capture {
                event: CaptureEvent::Completed(_),
                ..
            } => "capture_completed",
            HardwareEvent::Capture {
                event: CaptureEvent::Failed(_),
                ..
            } => "capture_failed",
        }
    }
}

/// Posts hardware notifications onto the handler thread's queue.
#[derive(Clone)]
pub struct EventSink {
    sender: Sender<HandlerMessage>,
}

impl EventSink {
    pub(crate) fn new(sender: Sender<HandlerMessage>) -> Self {
        Self { sender }
    }

    pub fn post(&self, event: HardwareEvent) {
        let name = event.name();
        if self.sender.send(HandlerMessage::Hardware(event)).is_err() {
            debug!("Dropping {} event, camera handler has stopped", name);
        }
    }

    pub fn device(&self, event: DeviceEvent) {
        self.post(HardwareEvent::Device(event));
    }

    pub fn session(&self, event: SessionEvent) {
        self.post(HardwareEvent::Session(event));
    }

    pub fn capture(&self, listener: CaptureListener, event: CaptureEvent) {
        self.post(HardwareEvent::Capture { listener, event });
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}
