use super::{Camera2Handler, SessionContext};
use crate::callbacks::{AutoFocusCallback, OpenCallback, PreviewStartedCallback};
use crate::error::{AgentError, Result};
use crate::handler::ActionKind;
use crate::request::{AfTrigger, AfMode};
use crate::settings::{legacy_areas_to_metering, CameraSettings, FlashMode, SceneMode};
use crate::state::CameraState;
use crate::subsystem::CaptureListener;
use crate::surface::{PreviewTexture, Surface};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl Camera2Handler {
    pub(super) fn open_camera(
        &mut self,
        index: usize,
        callback: Arc<dyn OpenCallback>,
    ) -> Result<()> {
        if self.state() != CameraState::Unopened {
            self.stats.record_rejected();
            callback.on_device_opened_already(index, self.history.describe(index));
            return Ok(());
        }

        self.ctx.open_callback = Some(Arc::clone(&callback));
        self.ctx.camera_index = index;
        self.ctx.camera_id = None;

        let camera_id = self.registry.lock().device_id(index)?.map(str::to_string);
        let Some(camera_id) = camera_id else {
            info!("Camera index {} refers to a device that is gone", index);
            callback.on_camera_disabled(index);
            return Ok(());
        };

        debug!("Opening camera {} (index {})", camera_id, index);
        self.ctx.camera_id = Some(camera_id.clone());
        self.subsystem
            .open_device(&camera_id, self.core.handler.event_sink())?;
        Ok(())
    }

    pub(super) fn release(&mut self) {
        if self.state() == CameraState::Unopened {
            self.reject("Ignoring release at inappropriate time");
            return;
        }

        if self.ctx.session.is_some() {
            self.close_preview_session();
        }
        if let Some(mut device) = self.ctx.device.take() {
            info!("Closing camera device {}", device.id());
            device.close();
        }
        if let Some(surface) = self.ctx.preview_surface.take() {
            surface.release();
        }

        self.ctx = SessionContext::default();
        self.last_af_state = None;
        self.set_state(CameraState::Unopened);
    }

    pub(super) fn set_preview_texture(&mut self, texture: Arc<PreviewTexture>) -> Result<()> {
        const ACTION: ActionKind = ActionKind::SetPreviewTexture;

        if self.state().below(CameraState::Configured) {
            self.reject("Ignoring texture setting at inappropriate time");
            return Ok(());
        }

        if let Some(current) = &self.ctx.preview_texture {
            if Arc::ptr_eq(current, &texture) {
                info!("Optimizing out redundant preview texture setting");
                return Ok(());
            }
        }

        if self.ctx.session.is_some() {
            self.close_preview_session();
        }

        let preview_size = self
            .ctx
            .preview_size
            .ok_or(AgentError::missing("preview size", ACTION))?;
        let request = self
            .ctx
            .persistent_request
            .as_mut()
            .ok_or(AgentError::missing("persistent request", ACTION))?;

        texture.set_default_buffer_size(preview_size);

        if let Some(previous) = self.ctx.preview_surface.take() {
            request.remove_target(previous.id());
            previous.release();
        }
        let surface = Surface::new(&texture);
        request.add_target(surface.id());

        self.ctx.preview_texture = Some(texture);
        self.ctx.preview_surface = Some(surface.clone());

        let device = self
            .ctx
            .device
            .as_mut()
            .ok_or(AgentError::missing("camera device", ACTION))?;
        if let Err(e) = device.create_session(vec![surface]) {
            error!("Failed to create camera capture session: {}", e);
        }
        Ok(())
    }

    pub(super) fn close_preview_session(&mut self) {
        if let Some(mut session) = self.ctx.session.take() {
            if let Err(e) = session.abort_captures() {
                error!("Failed to close existing camera capture session: {}", e);
            }
        }
        self.set_state(CameraState::Configured);
    }

    pub(super) fn start_preview(&mut self, callback: Option<PreviewStartedCallback>) -> Result<()> {
        const ACTION: ActionKind = ActionKind::StartPreview;

        if self.state() != CameraState::PreviewReady {
            self.reject("Refusing to start preview at inappropriate time");
            return Ok(());
        }

        let session = self
            .ctx
            .session
            .as_mut()
            .ok_or(AgentError::missing("capture session", ACTION))?;
        let request = self
            .ctx
            .persistent_request
            .as_ref()
            .ok_or(AgentError::missing("persistent request", ACTION))?;

        self.ctx.oneshot_preview_callback = callback;
        self.core.state.set_state(CameraState::PreviewActive);
        if let Err(e) = session.set_repeating_request(request.build(), CaptureListener::FocusState)
        {
            warn!("Unable to start preview: {}", e);
            self.ctx.oneshot_preview_callback = None;
            self.core.state.set_state(CameraState::PreviewReady);
        }
        Ok(())
    }

    pub(super) fn stop_preview(&mut self) -> Result<()> {
        if self.state().below(CameraState::PreviewActive) {
            self.reject("Refusing to stop preview at inappropriate time");
            return Ok(());
        }

        let session = self
            .ctx
            .session
            .as_mut()
            .ok_or(AgentError::missing("capture session", ActionKind::StopPreview))?;
        match session.stop_repeating() {
            Ok(()) => self.core.state.set_state(CameraState::PreviewReady),
            Err(e) => error!("Unable to stop preview: {}", e),
        }
        Ok(())
    }

    /// Merge `settings` into the persistent request.
    pub(super) fn apply_to_request(&mut self, settings: CameraSettings) -> Result<()> {
        let state = self.state();
        if state == CameraState::Unopened {
            self.reject("Ignoring settings for an unopened camera");
            return Ok(());
        }

        let active_array = self
            .ctx
            .active_array
            .ok_or(AgentError::missing("active array", ActionKind::ApplySettings))?;
        let request = self
            .ctx
            .persistent_request
            .as_mut()
            .ok_or(AgentError::missing("persistent request", ActionKind::ApplySettings))?;

        // A new preview size only reaches the texture on the next texture change
        self.ctx.preview_size = Some(settings.preview_size);

        request.af_mode = Some(AfMode::from(settings.focus_mode));
        request.af_regions = legacy_areas_to_metering(&settings.focus_areas, active_array);
        request.ae_regions = legacy_areas_to_metering(&settings.metering_areas, active_array);
        if settings.flash_mode != FlashMode::NoFlash {
            request.flash_mode = Some(settings.flash_mode);
        }
        if settings.scene_mode != SceneMode::NoSceneMode {
            request.scene_mode = Some(settings.scene_mode);
        }
        let snapshot = request.build();
        self.ctx.settings = Some(settings);

        if state.at_least(CameraState::PreviewActive) {
            // Already previewing: reflect the settings immediately
            let session = self
                .ctx
                .session
                .as_mut()
                .ok_or(AgentError::missing("capture session", ActionKind::ApplySettings))?;
            if let Err(e) = session.set_repeating_request(snapshot, CaptureListener::FocusState) {
                error!("Failed to apply updated request settings: {}", e);
            }
        } else if state.below(CameraState::PreviewReady) {
            // A ready preview session must not regress to configured
            self.set_state(CameraState::Configured);
        }
        Ok(())
    }

    pub(super) fn auto_focus(&mut self, callback: Option<AutoFocusCallback>) -> Result<()> {
        const ACTION: ActionKind = ActionKind::AutoFocus;

        // In passive focus modes a repeated request leaves the lens locked
        // where it is; in auto mode it scans again before locking.
        if self.state().below(CameraState::PreviewActive) {
            self.reject("Ignoring attempt to autofocus without preview");
            return Ok(());
        }

        let session = self
            .ctx
            .session
            .as_mut()
            .ok_or(AgentError::missing("capture session", ACTION))?;
        let request = self
            .ctx
            .persistent_request
            .as_mut()
            .ok_or(AgentError::missing("persistent request", ACTION))?;

        // The callback is armed once the trigger capture completes; from then
        // on the repeating results are watched for a locked lens.
        self.core.state.set_state(CameraState::FocusLocked);
        request.af_trigger = AfTrigger::Start;
        let submitted = session.capture(request.build(), CaptureListener::AutoFocusTrigger);
        request.af_trigger = AfTrigger::Idle;

        match submitted {
            Ok(()) => self.ctx.pending_af_trigger = callback,
            Err(e) => {
                error!("Unable to lock autofocus: {}", e);
                self.core.state.set_state(CameraState::PreviewActive);
                if let (Some(callback), Some(proxy)) = (callback, self.ctx.proxy.clone()) {
                    callback(false, proxy);
                }
            }
        }
        Ok(())
    }

    pub(super) fn cancel_auto_focus(&mut self) -> Result<()> {
        const ACTION: ActionKind = ActionKind::CancelAutoFocus;

        if self.state().below(CameraState::PreviewActive) {
            self.reject("Ignoring attempt to release focus lock without preview");
            return Ok(());
        }

        let session = self
            .ctx
            .session
            .as_mut()
            .ok_or(AgentError::missing("capture session", ACTION))?;
        let request = self
            .ctx
            .persistent_request
            .as_mut()
            .ok_or(AgentError::missing("persistent request", ACTION))?;

        self.core.state.set_state(CameraState::PreviewActive);
        request.af_trigger = AfTrigger::Cancel;
        let submitted = session.capture(request.build(), CaptureListener::Untracked);
        request.af_trigger = AfTrigger::Idle;

        if let Err(e) = submitted {
            error!("Unable to cancel autofocus: {}", e);
            self.core.state.set_state(CameraState::FocusLocked);
        }
        Ok(())
    }
}
