use super::Camera2Handler;
use crate::error::Result;
use crate::proxy::CameraProxy;
use crate::request::RequestTemplate;
use crate::state::CameraState;
use crate::subsystem::{
    AfState, CameraDevice, CaptureEvent, CaptureListener, CaptureResult, CaptureSession,
    DeviceEvent, HardwareEvent, SessionEvent,
};
use tracing::{debug, error, trace, warn};

impl Camera2Handler {
    pub(super) fn handle_hardware_event(&mut self, event: HardwareEvent) {
        trace!("Hardware event {}", event.name());
        match event {
            HardwareEvent::Device(event) => self.on_device_event(event),
            HardwareEvent::Session(event) => self.on_session_event(event),
            HardwareEvent::Capture { listener, event } => self.on_capture_event(listener, event),
        }
    }

    // Connection to and disconnection from camera devices
    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened(device) => self.on_device_opened(device),
            DeviceEvent::Disconnected => {
                warn!(
                    "Camera device '{}' was disconnected",
                    self.ctx.camera_id.as_deref().unwrap_or("unknown")
                );
            }
            DeviceEvent::Error(code) => {
                error!(
                    "Camera device '{}' encountered error code '{}'",
                    self.ctx.camera_index, code
                );
                if let Some(callback) = &self.ctx.open_callback {
                    callback.on_device_open_failure(
                        self.ctx.camera_index,
                        self.history.describe(self.ctx.camera_index),
                    );
                }
            }
        }
    }

    fn on_device_opened(&mut self, mut device: Box<dyn CameraDevice>) {
        let Some(callback) = self.ctx.open_callback.clone() else {
            warn!("Closing camera device {} that nobody asked for", device.id());
            device.close();
            return;
        };

        let index = self.ctx.camera_index;
        match self.populate_opened(device.as_mut()) {
            Ok(proxy) => {
                self.ctx.device = Some(device);
                self.set_state(CameraState::Unconfigured);
                callback.on_camera_opened(proxy);
            }
            Err(e) => {
                error!("Failed to initialize opened camera {}: {}", index, e);
                device.close();
                callback.on_device_open_failure(index, self.history.describe(index));
            }
        }
    }

    fn populate_opened(&mut self, device: &mut dyn CameraDevice) -> Result<CameraProxy> {
        let characteristics = self.subsystem.characteristics(device.id())?;
        let request = device.create_request_builder(RequestTemplate::Preview)?;

        let proxy = CameraProxy::new(
            self.core.clone(),
            self.ctx.camera_index,
            characteristics.clone(),
        );
        self.ctx.active_array = Some(characteristics.active_array);
        self.ctx.persistent_request = Some(request);
        self.ctx.proxy = Some(proxy.clone());
        Ok(proxy)
    }

    // Transitions into and out of a capture session
    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Configured(session) => self.on_session_configured(session),
            SessionEvent::ConfigureFailed => {
                error!("Failed to configure the camera for capture");
            }
            SessionEvent::Active => {
                if let Some(callback) = self.ctx.oneshot_preview_callback.take() {
                    // The session is processing preview requests
                    callback();
                }
            }
        }
    }

    fn on_session_configured(&mut self, mut session: Box<dyn CaptureSession>) {
        if self.state().below(CameraState::Configured) {
            warn!("Discarding capture session configured after release");
            if let Err(e) = session.abort_captures() {
                debug!("Failed to abort stray capture session: {}", e);
            }
            return;
        }

        self.ctx.session = Some(session);
        self.set_state(CameraState::PreviewReady);
    }

    fn on_capture_event(&mut self, listener: CaptureListener, event: CaptureEvent) {
        match (listener, event) {
            (CaptureListener::FocusState, CaptureEvent::Completed(result)) => {
                self.on_focus_state_result(&result);
            }
            (CaptureListener::FocusState, CaptureEvent::Failed(failure)) => {
                error!("Capture attempt failed with reason {}", failure.reason);
            }
            (CaptureListener::AutoFocusTrigger, CaptureEvent::Completed(_)) => {
                // From now on, the focus state listener fires the callback the
                // first time it finds the lens locked
                if let Some(callback) = self.ctx.pending_af_trigger.take() {
                    self.ctx.oneshot_af_callback = Some(callback);
                }
            }
            (CaptureListener::AutoFocusTrigger, CaptureEvent::Failed(failure)) => {
                error!("Focusing failed with reason {}", failure.reason);
                if let Some(callback) = self.ctx.pending_af_trigger.take() {
                    match self.ctx.proxy.clone() {
                        Some(proxy) => callback(false, proxy),
                        None => warn!("Dropping autofocus callback, camera is closed"),
                    }
                }
            }
            (CaptureListener::Untracked, _) => {}
        }
    }

    fn on_focus_state_result(&mut self, result: &CaptureResult) {
        let Some(af_state) = result.af_state else {
            return;
        };
        let changed = self.last_af_state != Some(af_state);
        self.last_af_state = Some(af_state);

        let Some(proxy) = self.ctx.proxy.clone() else {
            return;
        };

        if af_state.is_passive() {
            if changed {
                if let Some(callback) = &self.ctx.passive_af_callback {
                    // Scanning means the motor is moving; otherwise it has settled
                    callback(af_state == AfState::PassiveScan, proxy);
                }
            }
        } else if af_state.is_locked() {
            if let Some(callback) = self.ctx.oneshot_af_callback.take() {
                // The lens is now fixed; report whether the image is in focus
                callback(af_state == AfState::FocusedLocked, proxy);
            }
        }
    }
}
